use std::sync::LazyLock;

use regex::RegexSet;
use serde_json::Value;

use crate::{
    error::{ServiceError, ServiceResult},
    models::{ExecutionRequest, Language, RunRequest},
};

/// Source patterns that reject a snippet before it is ever executed.
///
/// This is a cheap static filter layered in front of the process sandbox. It
/// is trivially bypassable by a determined author (string concatenation,
/// aliasing, reflection) and must never be treated as an isolation boundary.
/// Every rule applies to every language.
const DENYLIST: &[(&str, &str)] = &[
    ("js-require-fs", r#"require\s*\(\s*['"]fs['"]"#),
    ("js-require-child-process", r#"require\s*\(\s*['"]child_process['"]"#),
    ("js-require-net", r#"require\s*\(\s*['"]net['"]"#),
    ("js-require-http", r#"require\s*\(\s*['"]http['"]"#),
    ("js-require-https", r#"require\s*\(\s*['"]https['"]"#),
    ("js-import-fs", r#"import\s+.*\s+from\s+['"]fs['"]"#),
    ("js-process-exit", r"process\.exit"),
    ("js-process-env", r"process\.env"),
    ("eval", r"eval\s*\("),
    ("js-function-constructor", r"Function\s*\("),
    ("rust-std-process", r"std::process"),
    ("rust-std-fs", r"std::fs"),
    ("rust-std-net", r"std::net"),
    ("rust-unsafe-block", r"unsafe\s*\{"),
    ("py-exec", r"exec\s*\("),
    ("py-import-os", r"import\s+os"),
    ("py-import-subprocess", r"import\s+subprocess"),
    ("py-import-socket", r"import\s+socket"),
    ("py-from-os-import", r"from\s+os\s+import"),
];

static DENYLIST_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(DENYLIST.iter().map(|(_, pattern)| *pattern))
        .expect("denylist patterns are valid regular expressions")
});

/// Names of the denylist rules matched by `code`, in table order.
pub fn denylist_matches(code: &str) -> Vec<&'static str> {
    DENYLIST_SET
        .matches(code)
        .into_iter()
        .map(|idx| DENYLIST[idx].0)
        .collect()
}

/// Checks a raw request and turns it into something the executor may run.
pub fn validate(request: &RunRequest, max_code_size: usize) -> ServiceResult<ExecutionRequest> {
    let code = match &request.code {
        Some(Value::String(code)) if !code.is_empty() => code,
        _ => {
            return Err(ServiceError::InvalidInput(
                "Code is required and must be a string".to_string(),
            ));
        }
    };

    if code.chars().count() > max_code_size {
        return Err(ServiceError::InvalidInput(format!(
            "Code size exceeds maximum limit of {max_code_size} characters"
        )));
    }

    let language = request
        .language
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Language::from_tag)
        .ok_or_else(|| {
            let allowed = Language::ALL
                .iter()
                .map(Language::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            ServiceError::InvalidInput(format!("Language must be one of: {allowed}"))
        })?;

    let input = match &request.input {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(input)) => input.clone(),
        Some(_) => {
            return Err(ServiceError::InvalidInput(
                "Input must be a string".to_string(),
            ));
        }
    };

    if input.chars().count() > max_code_size {
        return Err(ServiceError::InvalidInput(
            "Input size exceeds maximum limit".to_string(),
        ));
    }

    let matched = denylist_matches(code);
    if !matched.is_empty() {
        tracing::warn!(%language, rules = ?matched, "code rejected by denylist");
        return Err(ServiceError::SecurityViolation);
    }

    Ok(ExecutionRequest {
        code: code.clone(),
        language,
        input,
    })
}
