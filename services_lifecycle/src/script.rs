//! Startup script parsing
//!
//! The script is line oriented: semicolon-terminated lines of
//! comma-separated fields
//! `Type, FilePath, EntryPoint, Name, Priority, StackSize,
//! ExceptionAction, Flags;` and a `!` sentinel ending the script.
//! A malformed line fails that entry only; the rest of the script
//! still loads.

use exec_types::{config, EsError, ExceptionAction};

/// Whether a script line declares an application or a shared library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEntryKind {
    App,
    Lib,
}

/// One parsed startup script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupEntry {
    pub kind: ScriptEntryKind,
    pub file: String,
    pub entry_point: String,
    pub name: String,
    pub priority: u8,
    pub stack_size: usize,
    pub exception_action: ExceptionAction,
}

const FIELD_COUNT: usize = 8;

/// Parses one semicolon-terminated script line
pub fn parse_script_line(line: &str) -> Result<StartupEntry, EsError> {
    if line.len() > config::STARTUP_SCRIPT_MAX_LINE {
        return Err(EsError::AppCreate(format!(
            "script line exceeds {} bytes",
            config::STARTUP_SCRIPT_MAX_LINE
        )));
    }
    let body = line
        .trim()
        .strip_suffix(';')
        .ok_or_else(|| EsError::AppCreate("script line missing ';' terminator".to_string()))?;

    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(EsError::AppCreate(format!(
            "expected {} fields, got {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let kind = match fields[0] {
        "APP" => ScriptEntryKind::App,
        "LIB" => ScriptEntryKind::Lib,
        other => {
            return Err(EsError::AppCreate(format!(
                "unknown entry type '{other}'"
            )))
        }
    };
    if fields[1].len() > config::MAX_PATH_LEN {
        return Err(EsError::AppCreate(format!(
            "file path exceeds {} bytes",
            config::MAX_PATH_LEN
        )));
    }
    let priority: u8 = fields[4]
        .parse()
        .map_err(|_| EsError::AppCreate(format!("bad priority '{}'", fields[4])))?;
    let stack_size: usize = fields[5]
        .parse()
        .map_err(|_| EsError::AppCreate(format!("bad stack size '{}'", fields[5])))?;
    let exception_field: u32 = fields[6]
        .parse()
        .map_err(|_| EsError::AppCreate(format!("bad exception action '{}'", fields[6])))?;

    Ok(StartupEntry {
        kind,
        file: fields[1].to_string(),
        entry_point: fields[2].to_string(),
        name: fields[3].to_string(),
        priority,
        stack_size,
        exception_action: ExceptionAction::from_script_field(exception_field),
    })
}

/// Parses a whole script, stopping at the `!` sentinel
///
/// Returns each line's outcome in order so the caller can log the
/// failures while still acting on the good entries.
pub fn parse_script(text: &str) -> Vec<Result<StartupEntry, EsError>> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('!') {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push(parse_script_line(line));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_LINE: &str = "APP, /cf/apps/sample.so, SAMPLE_Main, SAMPLE, 50, 8192, 0, 0;";

    #[test]
    fn test_parse_app_line() {
        let entry = parse_script_line(GOOD_LINE).unwrap();
        assert_eq!(entry.kind, ScriptEntryKind::App);
        assert_eq!(entry.file, "/cf/apps/sample.so");
        assert_eq!(entry.entry_point, "SAMPLE_Main");
        assert_eq!(entry.name, "SAMPLE");
        assert_eq!(entry.priority, 50);
        assert_eq!(entry.stack_size, 8192);
        assert_eq!(entry.exception_action, ExceptionAction::RestartApp);
    }

    #[test]
    fn test_parse_lib_line() {
        let entry =
            parse_script_line("LIB, /cf/apps/lib.so, LIB_Init, CFS_LIB, 0, 0, 1, 0;").unwrap();
        assert_eq!(entry.kind, ScriptEntryKind::Lib);
        assert_eq!(entry.exception_action, ExceptionAction::ProcessorReset);
    }

    #[test]
    fn test_short_line_rejected() {
        let err = parse_script_line("APP, /cf/apps/sample.so, SAMPLE_Main, SAMPLE;");
        assert!(matches!(err, Err(EsError::AppCreate(_))));
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let err = parse_script_line("WIDGET, /a, B, C, 1, 2, 0, 0;");
        assert!(matches!(err, Err(EsError::AppCreate(_))));
    }

    #[test]
    fn test_overlong_file_path_rejected() {
        // Fits the line limit but not the path limit
        let line = format!("APP, /{}, M, N, 1, 2, 0, 0;", "p".repeat(80));
        assert!(matches!(
            parse_script_line(&line),
            Err(EsError::AppCreate(_))
        ));
    }

    #[test]
    fn test_overlong_line_rejected() {
        let line = format!("APP, /{}, M, N, 1, 2, 0, 0;", "x".repeat(200));
        assert!(matches!(
            parse_script_line(&line),
            Err(EsError::AppCreate(_))
        ));
    }

    #[test]
    fn test_script_stops_at_sentinel_and_skips_blanks() {
        let text = format!("{GOOD_LINE}\n\n!\nAPP, /ignored, I, J, 1, 2, 0, 0;\n");
        let results = parse_script(&text);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_bad_middle_line_does_not_stop_parsing() {
        let text = format!(
            "{GOOD_LINE}\nAPP, broken line;\nAPP, /cf/b.so, B_Main, B, 60, 4096, 1, 0;\n!\n"
        );
        let results = parse_script(&text);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
