use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;

use crate::{
    config::{RuntimeConfig, RustLibrary},
    models::Language,
    sandbox::Invocation,
};

/// Wraps a snippet in a runnable harness and writes it into a workspace.
///
/// Adapters never embed the request's input in the generated source; the
/// executor feeds it through stdin.
#[async_trait]
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;
    async fn materialize(&self, workspace: &Path, code: &str) -> anyhow::Result<Invocation>;
}

/// One adapter per `Language` variant.
pub struct AdapterRegistry {
    rust: RustAdapter,
    javascript: JavaScriptAdapter,
    python: PythonAdapter,
}

impl AdapterRegistry {
    pub fn from_config(runtimes: &RuntimeConfig) -> Self {
        Self {
            rust: RustAdapter {
                cargo_bin: runtimes.cargo_bin.clone(),
                library: runtimes.rust_library.clone(),
            },
            javascript: JavaScriptAdapter {
                node_bin: runtimes.node_bin.clone(),
            },
            python: PythonAdapter {
                python_bin: runtimes.python_bin.clone(),
            },
        }
    }

    pub fn adapter(&self, language: Language) -> &dyn LanguageAdapter {
        match language {
            Language::Rust => &self.rust,
            Language::JavaScript => &self.javascript,
            Language::Python => &self.python,
        }
    }
}

pub struct RustAdapter {
    cargo_bin: String,
    library: Option<RustLibrary>,
}

impl RustAdapter {
    fn manifest(&self) -> String {
        let mut manifest = String::from(concat!(
            "[package]\n",
            "name = \"playground\"\n",
            "version = \"0.1.0\"\n",
            "edition = \"2021\"\n",
            "\n",
            "[dependencies]\n",
        ));
        if let Some(library) = &self.library {
            manifest.push_str(&format!(
                "{} = {{ path = {} }}\n",
                library.name,
                toml_string(&library.path.to_string_lossy())
            ));
        }
        manifest.push_str(concat!(
            "tokio = { version = \"1.0\", features = [\"full\"] }\n",
            "serde = { version = \"1.0\", features = [\"derive\"] }\n",
            "serde_json = \"1.0\"\n",
        ));
        manifest
    }

    fn main_source(&self, code: &str) -> String {
        let prelude = self
            .library
            .as_ref()
            .map(|library| {
                format!(
                    "#[allow(unused_imports)]\nuse {}::prelude::*;\n",
                    library.name.replace('-', "_")
                )
            })
            .unwrap_or_default();

        format!(
            "{prelude}use std::error::Error;\n\n\
             #[tokio::main]\n\
             async fn main() -> Result<(), Box<dyn Error>> {{\n\
             {code}\n\
             \x20   Ok(())\n\
             }}\n"
        )
    }
}

#[async_trait]
impl LanguageAdapter for RustAdapter {
    fn language(&self) -> Language {
        Language::Rust
    }

    async fn materialize(&self, workspace: &Path, code: &str) -> anyhow::Result<Invocation> {
        tokio::fs::write(workspace.join("Cargo.toml"), self.manifest())
            .await
            .context("failed to write Cargo.toml")?;
        tokio::fs::create_dir(workspace.join("src"))
            .await
            .context("failed to create src directory")?;
        tokio::fs::write(workspace.join("src").join("main.rs"), self.main_source(code))
            .await
            .context("failed to write src/main.rs")?;

        Ok(Invocation::new(&self.cargo_bin, &["run", "--quiet"]))
    }
}

pub struct JavaScriptAdapter {
    node_bin: String,
}

// Real streams and the exit-code hook are captured before the snippet's
// scope rebinds the dangerous globals to `undefined`.
const JS_PRELUDE: &str = r#"const __format = require('util').format;
const __stdout = process.stdout;
const __stderr = process.stderr;
const __console = {
  log: (...args) => __stdout.write(__format(...args) + '\n'),
  info: (...args) => __stdout.write(__format(...args) + '\n'),
  warn: (...args) => __stderr.write(__format(...args) + '\n'),
  error: (...args) => __stderr.write(__format(...args) + '\n'),
};
const __reportError = (error) => {
  const message = error instanceof Error ? `${error.name}: ${error.message}` : `Error: ${error}`;
  __stderr.write(message + '\n');
  process.exitCode = 1;
};

((console, __reportError, process, require, global, globalThis, Buffer) => {
  (async () => {
    try {
"#;

const JS_EPILOGUE: &str = r#"
    } catch (error) {
      __reportError(error);
    }
  })();
})(__console, __reportError, undefined, undefined, undefined, undefined, undefined);
"#;

impl JavaScriptAdapter {
    fn script(&self, code: &str) -> String {
        format!("{JS_PRELUDE}{code}{JS_EPILOGUE}")
    }
}

#[async_trait]
impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    async fn materialize(&self, workspace: &Path, code: &str) -> anyhow::Result<Invocation> {
        tokio::fs::write(workspace.join("script.js"), self.script(code))
            .await
            .context("failed to write script.js")?;
        Ok(Invocation::new(&self.node_bin, &["script.js"]))
    }
}

pub struct PythonAdapter {
    python_bin: String,
}

const PY_PRELUDE: &str = "import sys
import io

_sandbox_stdout = sys.stdout
sys.stdout = io.StringIO()
_sandbox_failed = False

try:
";

const PY_EPILOGUE: &str = "    pass
except Exception as e:
    _sandbox_failed = True
    print(f\"{type(e).__name__}: {e}\", file=sys.stderr)
finally:
    _sandbox_output = sys.stdout.getvalue()
    sys.stdout = _sandbox_stdout
    print(_sandbox_output, end='')
    sys.stdout.flush()

if _sandbox_failed:
    sys.exit(1)
";

impl PythonAdapter {
    fn script(&self, code: &str) -> String {
        let body = code
            .lines()
            .map(|line| format!("    {line}\n"))
            .collect::<String>();
        format!("{PY_PRELUDE}{body}{PY_EPILOGUE}")
    }
}

#[async_trait]
impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn materialize(&self, workspace: &Path, code: &str) -> anyhow::Result<Invocation> {
        tokio::fs::write(workspace.join("script.py"), self.script(code))
            .await
            .context("failed to write script.py")?;
        Ok(Invocation::new(&self.python_bin, &["script.py"]))
    }
}

fn toml_string(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
