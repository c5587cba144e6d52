use serde_json::Value;

use hostvenv_core::ExecutionOutcome;

use crate::style::Style;

/// Human lines describing a setup report carried in `details`.
pub fn render_details(style: &Style, details: &Value) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(target) = text(details, "target_version") {
        lines.push(style.field("host python", target));
    }
    if let Some(environment) = details.get("environment") {
        match environment.get("action").and_then(Value::as_str) {
            Some("already_valid") => lines.push(style.field("environment", "reused (version matches)")),
            Some("created") => {
                let replaced = environment.get("replaced").and_then(Value::as_bool).unwrap_or(false);
                let verb = if replaced { "recreated" } else { "created" };
                let interpreter = environment
                    .get("interpreter")
                    .map(describe_interpreter)
                    .unwrap_or_default();
                lines.push(style.field("environment", &format!("{verb} with {interpreter}")));
            }
            _ => {}
        }
    }
    if let Some(path) = text(details, "environment_path") {
        lines.push(style.field("location", path));
    }
    if let Some(install) = details.get("install").filter(|value| !value.is_null()) {
        let requirement = install.get("requirement").map(describe_requirement).unwrap_or_default();
        let line = match install.get("installed_version").and_then(Value::as_str) {
            Some(version) => format!("{requirement} (installed {version})"),
            None => requirement,
        };
        lines.push(style.field("package", &line));
    }
    if let Some(update) = details.get("search_path").filter(|value| !value.is_null()) {
        let path = update.get("path").and_then(Value::as_str).unwrap_or_default();
        let suffix = if update.get("added").and_then(Value::as_bool).unwrap_or(false) {
            ""
        } else {
            " (already present)"
        };
        lines.push(style.field("search path", &format!("{path}{suffix}")));
    }
    if let Some(check) = details.get("import_check").filter(|value| !value.is_null()) {
        let module = check.get("module").and_then(Value::as_str).unwrap_or("module");
        let line = if check.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let version = check.get("version").and_then(Value::as_str).unwrap_or("unknown version");
            format!("import {module} ok ({version})")
        } else {
            format!("import {module} failed")
        };
        lines.push(style.field("import check", &line));
    }
    if let Some(pid) = details.get("terminal_pid").and_then(Value::as_u64) {
        lines.push(style.field("terminal pid", &pid.to_string()));
    }
    if let Some(warnings) = details.get("warnings").and_then(Value::as_array) {
        for warning in warnings.iter().filter_map(Value::as_str) {
            lines.push(style.warning(warning));
        }
    }
    if let Some(hint) = hint_from_details(details) {
        lines.push(style.info(&format!("Hint: {hint}")));
    }
    lines
}

pub fn render(style: &Style, outcome: &ExecutionOutcome) -> Vec<String> {
    let mut lines = vec![style.status(outcome.status, &outcome.message)];
    lines.extend(render_details(style, &outcome.details));
    lines
}

fn text<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details.get(key).and_then(Value::as_str)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn describe_interpreter(candidate: &Value) -> String {
    let invocation = candidate.get("invocation");
    let location = match invocation.and_then(|value| value.get("kind")).and_then(Value::as_str) {
        Some("launcher") => {
            let program = invocation
                .and_then(|value| value.get("program"))
                .and_then(Value::as_str)
                .unwrap_or("launcher");
            let args: Vec<&str> = invocation
                .and_then(|value| value.get("args"))
                .and_then(Value::as_array)
                .map(|args| args.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            std::iter::once(program).chain(args).collect::<Vec<_>>().join(" ")
        }
        _ => invocation
            .and_then(|value| value.get("path"))
            .and_then(Value::as_str)
            .unwrap_or("python")
            .to_string(),
    };
    match candidate.get("reported_version").and_then(Value::as_str) {
        Some(version) => format!("{location} ({version})"),
        None => location,
    }
}

fn describe_requirement(requirement: &Value) -> String {
    let name = requirement.get("name").and_then(Value::as_str).unwrap_or_default();
    let constraint = requirement.get("constraint").and_then(Value::as_str).unwrap_or_default();
    format!("{name}{constraint}")
}
