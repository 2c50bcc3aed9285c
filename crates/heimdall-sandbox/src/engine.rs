//! RustPython VM lifecycle for the embedded Python engine.
//!
//! This module owns all RustPython API calls. It:
//! - Creates a fresh interpreter per worker with stdlib, import hook, output
//!   capture, and a virtual-filesystem bridge installed.
//! - Compiles and executes Python source, returning a [`VmRunResult`].
//! - Extracts structured errors (SyntaxError, RuntimeError, ModuleNotAllowed).
//! - Extracts the `__result__` return value from the scope after execution.
//!
//! ## Import Hook (Option C: `builtins.__import__` override)
//!
//! RustPython 0.3 resolves imports by calling `builtins.__import__`. The init
//! closure in `Interpreter::with_init` runs BEFORE `vm.initialize()`, so
//! `builtins.__import__` is not yet set. We therefore install the import hook
//! at the beginning of `run_code` (inside `interp.enter()`), which runs after
//! full initialization.
//!
//! ## Output Capture
//!
//! We replace `sys.stdout` and `sys.stderr` with minimal Python-level objects
//! whose `write(s)` method delegates to [`OutputBuffer::write_stdout`] /
//! [`OutputBuffer::write_stderr`]. The replacement also happens at the start of
//! each `run_code` call (inside `enter()`).
//!
//! ## Virtual filesystem bridge
//!
//! spec.md §3 treats the embedded engine's in-memory filesystem as an opaque
//! collaborator mounted at [`VROOT`]; [`VirtualFs`] is this crate's concrete
//! stand-in. `builtins.open` and `os.getcwd` are overridden so user code reads
//! and writes against that tree rather than the host filesystem, confined the
//! same way the rest of the engine is.
//!
//! ## Zero unsafe blocks
//!
//! This file contains no `unsafe` code. All RustPython integration uses the safe
//! public Rust API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rustpython_vm::{
    builtins::PyBaseExceptionRef,
    compiler::Mode,
    function::FuncArgs,
    scope::Scope,
    AsObject, Interpreter, PyObjectRef, PyResult, VirtualMachine,
};

use crate::modules::check_module_allowed;
use crate::output::OutputBuffer;
use crate::path_guard::VROOT;
use crate::types::ExecutionError;
use crate::vfs::VirtualFs;

// ── Public (crate-visible) types ─────────────────────────────────────────────

/// Internal result of running code in the VM.
/// This is an intermediate representation before constructing [`crate::types::ExecutionResult`].
pub(crate) struct VmRunResult {
    pub stdout: String,
    pub stderr: String,
    pub return_value: Option<String>,
    pub error: Option<ExecutionError>,
}

/// A configured interpreter bundled with its module allowlist and the
/// virtual filesystem it reads/writes against.
pub(crate) struct PyInterp {
    inner: Interpreter,
    allowed_set: Arc<HashSet<String>>,
    vfs: Arc<VirtualFs>,
}

impl PyInterp {
    /// Replace the allowed-module set for this interpreter.
    #[allow(dead_code)]
    pub(crate) fn set_allowed_set(&mut self, allowed_set: HashSet<String>) {
        self.allowed_set = Arc::new(allowed_set);
    }

    /// Execute a closure with access to the VirtualMachine.
    #[allow(dead_code)]
    pub(crate) fn with_vm<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&VirtualMachine) -> R,
    {
        self.inner.enter(f)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Return candidate filesystem paths for a Python standard library installation.
///
/// RustPython can use pure-Python stdlib modules (json, collections, re, etc.)
/// from a host Python installation when they are added to `Settings::path_list`.
/// Native extension modules provided by `rustpython_stdlib::get_module_inits()`
/// take precedence over any .so files on the same path.
fn python_stdlib_paths() -> Vec<String> {
    let candidates = [
        "/usr/local/lib/python3.13",
        "/usr/local/lib/python3.12",
        "/usr/local/lib/python3.11",
        "/usr/local/lib/python3.10",
        "/usr/local/lib/python3.9",
        "/usr/lib/python3",
        "/usr/lib/python3.12",
        "/usr/lib/python3.11",
        "/usr/lib/python3.10",
    ];
    candidates
        .iter()
        .filter(|p| std::path::Path::new(p).is_dir())
        .map(|p| p.to_string())
        .collect()
}

/// Create a new RustPython interpreter with stdlib configured.
///
/// The import hook, output capture, and virtual-filesystem bridge are
/// installed at the beginning of each `run_code` call (inside `enter()`),
/// because `builtins.__import__` is only available after `vm.initialize()`
/// which runs AFTER the `with_init` closure.
pub(crate) fn build_interpreter(
    allowed_set: HashSet<String>,
    _output: OutputBuffer,
    vfs: Arc<VirtualFs>,
) -> PyInterp {
    let mut settings = rustpython_vm::Settings::default();

    // The `freeze-stdlib` feature in rustpython-vm 0.3 only freezes the VM's
    // own core modules, not the full Python standard library. The full
    // stdlib is available via the host Python installation when present.
    for path in python_stdlib_paths() {
        settings.path_list.push(path);
    }

    let inner = Interpreter::with_init(settings, move |vm| {
        // ── Register stdlib modules ────────────────────────────────────────
        vm.add_native_modules(rustpython_stdlib::get_module_inits());

        // ── Register minimal frozen stdlib wrappers ────────────────────────
        // Freeze a minimal Python-level json module compatible with RustPython.
        vm.add_frozen(rustpython_vm::py_freeze!(
            source = r#"
import _json

class JSONDecodeError(ValueError):
    def __init__(self, msg, doc, pos):
        errmsg = '%s: line %d column %d (char %d)' % (
            msg,
            doc.count('\n', 0, pos) + 1,
            pos - doc.rfind('\n', 0, pos),
            pos,
        )
        ValueError.__init__(self, errmsg)
        self.msg = msg
        self.doc = doc
        self.pos = pos
        self.lineno = doc.count('\n', 0, pos) + 1
        self.colno = pos - doc.rfind('\n', 0, pos)

class JSONEncoder:
    def __init__(self, skipkeys=False, ensure_ascii=True,
                 check_circular=True, allow_nan=True, sort_keys=False,
                 indent=None, separators=None, default=None):
        self.skipkeys = skipkeys
        self.ensure_ascii = ensure_ascii
        self.check_circular = check_circular
        self.allow_nan = allow_nan
        self.sort_keys = sort_keys
        self.indent = indent
        if separators is not None:
            self.item_separator, self.key_separator = separators
        elif indent is not None:
            self.item_separator = ','
            self.key_separator = ': '
        else:
            self.item_separator = ', '
            self.key_separator = ': '
        self.default = default if default is not None else self._default

    def _default(self, obj):
        raise TypeError(f'Object of type {type(obj).__name__} is not JSON serializable')

    def encode(self, o):
        return _simple_encode(o, self)

    def iterencode(self, o, _one_shot=False):
        return iter([self.encode(o)])

def _simple_encode(obj, encoder):
    if obj is None:
        return 'null'
    elif obj is True:
        return 'true'
    elif obj is False:
        return 'false'
    elif isinstance(obj, int):
        return str(obj)
    elif isinstance(obj, float):
        if obj != obj:
            return 'NaN'
        elif obj == float('inf'):
            return 'Infinity'
        elif obj == float('-inf'):
            return '-Infinity'
        return repr(obj)
    elif isinstance(obj, str):
        return _encode_str(obj)
    elif isinstance(obj, (list, tuple)):
        if not obj:
            return '[]'
        items = [_simple_encode(v, encoder) for v in obj]
        return '[' + ', '.join(items) + ']'
    elif isinstance(obj, dict):
        if not obj:
            return '{}'
        keys = sorted(obj.keys()) if encoder.sort_keys else obj.keys()
        items = [_encode_str(str(k)) + ': ' + _simple_encode(v, encoder) for k, v in ((k, obj[k]) for k in keys)]
        return '{' + ', '.join(items) + '}'
    else:
        return encoder.default(obj)

def _encode_str(s):
    result = ['"']
    for c in s:
        if c == '"':
            result.append('\\"')
        elif c == '\\':
            result.append('\\\\')
        elif c == '\n':
            result.append('\\n')
        elif c == '\r':
            result.append('\\r')
        elif c == '\t':
            result.append('\\t')
        elif ord(c) < 0x20:
            result.append('\\u{:04x}'.format(ord(c)))
        else:
            result.append(c)
    result.append('"')
    return ''.join(result)

def dumps(obj, *, skipkeys=False, ensure_ascii=True, check_circular=True,
          allow_nan=True, cls=None, indent=None, separators=None, default=None,
          sort_keys=False, **kw):
    encoder = (cls or JSONEncoder)(
        skipkeys=skipkeys, ensure_ascii=ensure_ascii,
        check_circular=check_circular, allow_nan=allow_nan,
        indent=indent, separators=separators, default=default,
        sort_keys=sort_keys, **kw
    )
    return encoder.encode(obj)

def dump(obj, fp, **kwargs):
    fp.write(dumps(obj, **kwargs))

def loads(s, *, cls=None, object_hook=None, parse_float=None,
          parse_int=None, parse_constant=None, object_pairs_hook=None, **kw):
    if isinstance(s, (bytes, bytearray)):
        s = s.decode('utf-8')
    decoder = JSONDecoder(object_hook=object_hook, object_pairs_hook=object_pairs_hook,
                          parse_float=parse_float, parse_int=parse_int, strict=True)
    return decoder.decode(s)

def load(fp, **kwargs):
    return loads(fp.read(), **kwargs)

class JSONDecoder:
    def __init__(self, *, object_hook=None, parse_float=None, parse_int=None,
                 parse_constant=None, strict=True, object_pairs_hook=None):
        self.object_hook = object_hook
        self.object_pairs_hook = object_pairs_hook
        self.parse_float = parse_float or float
        self.parse_int = parse_int or int
        self.strict = strict
        self.scan_once = _json.make_scanner(self)

    def decode(self, s, _w=None):
        obj, end = self.raw_decode(s, 0)
        end = len(s.lstrip()) if not s else end
        return obj

    def raw_decode(self, s, idx=0):
        try:
            obj, end = self.scan_once(s, idx)
        except StopIteration as err:
            raise JSONDecodeError("Expecting value", s, err.value) from None
        return obj, end
"#,
            module_name = "json"
        ));
    });

    PyInterp {
        inner,
        allowed_set: Arc::new(allowed_set),
        vfs,
    }
}

/// Execute Python source code in the VM.
///
/// Installs the import allowlist hook, output capture, and virtual-filesystem
/// bridge at the start of each call (inside `enter()`), then compiles and
/// runs the code.
pub(crate) fn run_code(interp: &PyInterp, code_str: &str, output: OutputBuffer) -> VmRunResult {
    let allowed_set = Arc::clone(&interp.allowed_set);
    let vfs = Arc::clone(&interp.vfs);

    interp.inner.enter(|vm| {
        // ── Step 0: Install hooks ──────────────────────────────────────────
        // Idempotent: each call to run_code reinstalls them so each
        // execution starts with a clean hook state.
        install_import_hook(vm, &allowed_set);
        install_output_capture(vm, output.clone());
        install_vfs_bridge(vm, vfs);

        // ── Step 1: Compile ───────────────────────────────────────────────
        let code = match vm.compile(code_str, Mode::Exec, "<string>".to_owned()) {
            Ok(c) => c,
            Err(e) => {
                let (stdout, stderr) = output.into_strings();
                return VmRunResult {
                    stdout,
                    stderr,
                    return_value: None,
                    error: Some(extract_syntax_error(e)),
                };
            }
        };

        // ── Step 2: Execute in an isolated scope ──────────────────────────
        // Set __name__ = "__main__" so the import hook can distinguish user
        // code (which must pass the allowlist) from stdlib module internals.
        let scope = vm.new_scope_with_builtins();
        let _ = scope.globals.set_item(
            "__name__",
            vm.ctx.new_str("__main__").into(),
            vm,
        );
        let exec_result = vm.run_code_obj(code, scope.clone());

        let (stdout, stderr) = output.into_strings();

        match exec_result {
            Ok(_) => {
                // ── Step 3: Extract return value ──────────────────────────
                let return_value = extract_return_value(vm, &scope);
                VmRunResult {
                    stdout,
                    stderr,
                    return_value,
                    error: None,
                }
            }
            Err(exc) => {
                if let Some(module_err) = extract_module_not_allowed(vm, &exc) {
                    return VmRunResult {
                        stdout,
                        stderr,
                        return_value: None,
                        error: Some(module_err),
                    };
                }
                VmRunResult {
                    stdout,
                    stderr,
                    return_value: None,
                    error: Some(extract_runtime_error(vm, exc)),
                }
            }
        }
    })
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Returns `true` if the import is originating from user code (not from stdlib).
fn is_user_code_import(args: &FuncArgs, vm: &VirtualMachine) -> bool {
    let globals = match args.args.get(1) {
        Some(g) => g,
        None => return true,
    };

    if vm.is_none(globals) {
        return true;
    }

    if let Ok(name_val) = vm.call_method(globals, "get", (vm.ctx.new_str("__name__"),)) {
        if !vm.is_none(&name_val) {
            if let Ok(name_str) = name_val.str(vm) {
                let name = name_str.as_str();
                if !name.is_empty() && name != "__main__" {
                    return false;
                }
                if name == "__main__" {
                    return true;
                }
            }
        }
    }

    let file_val = vm
        .call_method(globals, "get", (vm.ctx.new_str("__file__"),))
        .ok();

    match file_val {
        None => true,
        Some(v) if vm.is_none(&v) => false,
        Some(v) => v
            .str(vm)
            .map(|s| {
                let file = s.as_str();
                file == "<string>" || file == "<stdin>" || file == "<module>" || file.is_empty()
            })
            .unwrap_or(true),
    }
}

/// Check if `module_name` is allowed, considering submodule imports.
fn is_module_allowed(module_name: &str, allowed_set: &HashSet<String>) -> bool {
    if check_module_allowed(module_name, allowed_set).is_ok() {
        return true;
    }

    if let Some(dot_pos) = module_name.find('.') {
        let parent = &module_name[..dot_pos];
        if check_module_allowed(parent, allowed_set).is_ok() {
            return true;
        }
    }

    false
}

/// Install `builtins.__import__` override that enforces the module allowlist
/// (Option C).
fn install_import_hook(vm: &VirtualMachine, allowed_set: &Arc<HashSet<String>>) {
    const SAVED_IMPORT_ATTR: &str = "__heimdall_original_import__";

    let original_import = if let Ok(saved) = vm.builtins.get_attr(SAVED_IMPORT_ATTR, vm) {
        saved
    } else {
        let real_original = match vm.builtins.get_attr("__import__", vm) {
            Ok(f) => f,
            Err(_) => return,
        };
        let _ = vm.builtins.set_attr(SAVED_IMPORT_ATTR, real_original.clone(), vm);
        real_original
    };

    #[allow(clippy::arc_with_non_send_sync)]
    let original_import = Arc::new(original_import);
    let allowed_set = Arc::clone(allowed_set);

    let hook = vm.new_function(
        "__import__",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let module_name: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();

            let level: i64 = args
                .args
                .get(4)
                .and_then(|o| {
                    use rustpython_vm::TryFromObject;
                    i64::try_from_object(vm, o.clone()).ok()
                })
                .unwrap_or(0);

            let full_module_name = if level > 0 {
                let package = args.args.get(1).and_then(|globals| {
                    vm.call_method(globals, "get", (vm.ctx.new_str("__package__"),))
                        .ok()
                        .filter(|v| !vm.is_none(v))
                        .and_then(|v| v.str(vm).ok())
                        .map(|s| s.as_str().to_owned())
                });

                if let Some(pkg) = package {
                    let base = if level > 1 {
                        let parts: Vec<&str> = pkg.split('.').collect();
                        let keep = parts.len().saturating_sub((level - 1) as usize);
                        parts[..keep].join(".")
                    } else {
                        pkg.clone()
                    };

                    if module_name.is_empty() {
                        base
                    } else {
                        format!("{base}.{module_name}")
                    }
                } else {
                    module_name.clone()
                }
            } else {
                module_name.clone()
            };

            let importing_from_user_code = is_user_code_import(&args, vm);

            if importing_from_user_code {
                let allowed = is_module_allowed(&full_module_name, &allowed_set);
                if !allowed {
                    let deny_name = if full_module_name != module_name {
                        full_module_name.clone()
                    } else {
                        module_name.clone()
                    };
                    return Err(vm.new_import_error(
                        format!("ModuleNotAllowed:{deny_name}"),
                        vm.ctx.new_str(deny_name),
                    ));
                }
            }

            original_import.call(args, vm)
        },
    );

    let _ = vm.builtins.set_attr("__import__", hook, vm);
}

/// Replace `sys.stdout` and `sys.stderr` with write-capturing objects.
fn install_output_capture(vm: &VirtualMachine, output: OutputBuffer) {
    let stdout_buf = output.clone();
    let stderr_buf = output;

    let stdout_obj = build_writer_object(vm, stdout_buf, true);
    let stderr_obj = build_writer_object(vm, stderr_buf, false);

    let _ = vm.sys_module.set_attr("stdout", stdout_obj, vm);
    let _ = vm.sys_module.set_attr("stderr", stderr_obj, vm);
}

fn build_writer_object(vm: &VirtualMachine, output: OutputBuffer, is_stdout: bool) -> PyObjectRef {
    let output = Arc::new(Mutex::new(output));
    let output_clone = Arc::clone(&output);

    let write_fn = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let data: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();

            let buf = output.lock().expect("OutputBuffer mutex poisoned");
            let write_result = if is_stdout {
                buf.write_stdout(data.as_bytes())
            } else {
                buf.write_stderr(data.as_bytes())
            };

            match write_result {
                Ok(()) => Ok(vm.ctx.new_int(data.len()).into()),
                Err(ExecutionError::OutputLimitExceeded { limit_bytes }) => {
                    Err(vm.new_exception_msg(
                        vm.ctx.exceptions.runtime_error.to_owned(),
                        format!("Output limit exceeded: {limit_bytes} bytes"),
                    ))
                }
                Err(_) => Err(vm.new_runtime_error("Write error".to_owned())),
            }
        },
    );

    let flush_fn = vm.new_function(
        "flush",
        move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let _buf = output_clone.lock().expect("OutputBuffer mutex poisoned");
            Ok(vm.ctx.none())
        },
    );

    let ns = vm.new_module("<writer>", vm.ctx.new_dict(), None);
    let _ = ns.set_attr("write", write_fn, vm);
    let _ = ns.set_attr("flush", flush_fn, vm);
    let _ = ns.set_attr("closed", vm.ctx.new_bool(false), vm);
    let _ = ns.set_attr("encoding", vm.ctx.new_str("utf-8"), vm);
    ns.into()
}

/// Resolve a path argument passed to `open()`/`os.getcwd()` callers against
/// `VROOT`, mirroring the virtual-path normalization `PathGuard` uses for the
/// host side (spec.md §4.1/§4.5): relative paths are joined onto the current
/// virtual working directory, which is always `VROOT` — user code never
/// `os.chdir()`s because that builtin is not overridden/exposed here.
fn resolve_virtual(path: &str) -> String {
    if path.starts_with(VROOT) {
        path.to_string()
    } else if let Some(stripped) = path.strip_prefix('/') {
        format!("{VROOT}/{stripped}")
    } else {
        format!("{VROOT}/{path}")
    }
}

/// Override `builtins.open` and `os.getcwd` so user code reads and writes
/// against [`VirtualFs`] instead of the host filesystem. Supplements
/// spec.md's module allowlist, which governs *imports* but says nothing
/// about what `open()` itself may touch once a module is allowed.
fn install_vfs_bridge(vm: &VirtualMachine, vfs: Arc<VirtualFs>) {
    let open_vfs = Arc::clone(&vfs);
    let open_fn = vm.new_function(
        "open",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let path: String = args
                .args
                .first()
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();
            let mode: String = args
                .args
                .get(1)
                .and_then(|o| o.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_else(|| "r".to_string());

            let virt_path = resolve_virtual(&path);
            build_vfs_file_object(vm, Arc::clone(&open_vfs), virt_path, mode)
        },
    );
    let _ = vm.builtins.set_attr("open", open_fn, vm);

    if let Ok(os_module) = vm.import("os", 0) {
        let getcwd_fn = vm.new_function(
            "getcwd",
            move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
                Ok(vm.ctx.new_str(VROOT).into())
            },
        );
        let _ = os_module.set_attr("getcwd", getcwd_fn, vm);
    }
}

/// Build a minimal file-like object over `VirtualFs`: `read()`, `write(s)`,
/// `close()`, and context-manager support, enough for the "read a config
/// file" / "write a result file" idioms user code reaches for.
fn build_vfs_file_object(
    vm: &VirtualMachine,
    vfs: Arc<VirtualFs>,
    path: String,
    mode: String,
) -> PyResult<PyObjectRef> {
    let writing = mode.contains('w') || mode.contains('a') || mode.contains('x');
    let binary = mode.contains('b');

    if writing {
        let append = mode.contains('a');
        let initial = if append {
            vfs.read_file(&path).unwrap_or_default()
        } else {
            Vec::new()
        };
        let buffer = Arc::new(Mutex::new(initial));

        let ns = vm.new_module("<vfs-file>", vm.ctx.new_dict(), None);

        let write_vfs = Arc::clone(&vfs);
        let write_path = path.clone();
        let write_buffer = Arc::clone(&buffer);
        let write_fn = vm.new_function(
            "write",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
                let data: String = args
                    .args
                    .first()
                    .and_then(|o| o.str(vm).ok())
                    .map(|s| s.as_str().to_owned())
                    .unwrap_or_default();
                let mut buf = write_buffer.lock().expect("vfs write buffer poisoned");
                buf.extend_from_slice(data.as_bytes());
                write_vfs
                    .write_file(&write_path, &buf)
                    .map_err(|e| vm.new_runtime_error(e.public_message()))?;
                Ok(vm.ctx.new_int(data.len()).into())
            },
        );
        let _ = ns.set_attr("write", write_fn, vm);

        let close_fn = vm.new_function(
            "close",
            move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
                Ok(vm.ctx.none())
            },
        );
        let _ = ns.set_attr("close", close_fn, vm);
        install_context_manager(vm, &ns);
        Ok(ns.into())
    } else {
        let data = vfs
            .read_file(&path)
            .map_err(|e| vm.new_file_not_found_error(e.public_message()))?;
        let text = String::from_utf8_lossy(&data).into_owned();

        let ns = vm.new_module("<vfs-file>", vm.ctx.new_dict(), None);
        let read_fn = vm.new_function(
            "read",
            move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
                if binary {
                    Ok(vm.ctx.new_bytes(data.clone()).into())
                } else {
                    Ok(vm.ctx.new_str(text.clone()).into())
                }
            },
        );
        let _ = ns.set_attr("read", read_fn, vm);

        let close_fn = vm.new_function(
            "close",
            move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
                Ok(vm.ctx.none())
            },
        );
        let _ = ns.set_attr("close", close_fn, vm);
        install_context_manager(vm, &ns);
        Ok(ns.into())
    }
}

fn install_context_manager(vm: &VirtualMachine, ns: &PyObjectRef) {
    let enter_target = ns.clone();
    let enter_fn = vm.new_function(
        "__enter__",
        move |_args: FuncArgs, _vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            Ok(enter_target.clone())
        },
    );
    let exit_fn = vm.new_function(
        "__exit__",
        move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            Ok(vm.ctx.new_bool(false).into())
        },
    );
    let _ = ns.set_attr("__enter__", enter_fn, vm);
    let _ = ns.set_attr("__exit__", exit_fn, vm);
}

/// Convert a RustPython compile error into [`ExecutionError::SyntaxError`].
fn extract_syntax_error(err: rustpython_vm::compiler::CompileError) -> ExecutionError {
    let (row, col) = err.python_location();
    ExecutionError::SyntaxError {
        message: err.to_string(),
        line: row as u32,
        col: col as u32,
    }
}

/// Extract a [`ExecutionError::ModuleNotAllowed`] if the exception originated
/// from our import hook sentinel. Returns `None` if it's a different exception.
fn extract_module_not_allowed(
    vm: &VirtualMachine,
    exc: &PyBaseExceptionRef,
) -> Option<ExecutionError> {
    let msg = exc.as_object().str(vm).ok()?;
    let s = msg.as_str();
    s.strip_prefix("ModuleNotAllowed:").map(|name| ExecutionError::ModuleNotAllowed {
        module_name: name.to_string(),
    })
}

/// Convert a RustPython runtime exception into [`ExecutionError::RuntimeError`].
fn extract_runtime_error(vm: &VirtualMachine, exc: PyBaseExceptionRef) -> ExecutionError {
    let message = exc
        .as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "Unknown runtime error".to_owned());

    let mut traceback = String::new();
    let _ = vm.write_exception(&mut traceback, &exc);

    ExecutionError::RuntimeError { message, traceback }
}

/// Try to extract the last expression value from the execution scope, using
/// the `__result__` variable name convention (see `wrap.rs`).
fn extract_return_value(vm: &VirtualMachine, scope: &Scope) -> Option<String> {
    let locals_obj: PyObjectRef = scope.locals.as_ref().to_owned();

    let result_obj = vm
        .call_method(&locals_obj, "get", (vm.ctx.new_str("__result__"),))
        .ok()?;

    if vm.is_none(&result_obj) {
        return None;
    }

    result_obj
        .repr(vm)
        .ok()
        .map(|s| s.as_str().to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
