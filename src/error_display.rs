//! User-facing error message formatting.
//!
//! Uses typed error matching (PolarsError variants, io::ErrorKind) rather
//! than string parsing to produce actionable messages for the status line.

use polars::prelude::PolarsError;
use std::io;

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check spelling and that the column exists.",
            msg
        ),
        PE::Duplicate(msg) => format!("Duplicate column in result: {}", msg),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::ShapeMismatch(msg) => format!("Row shape mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed: {}", msg),
        PE::OutOfBounds(msg) => format!("Index or row out of bounds: {}", msg),
        PE::SchemaFieldNotFound(msg) => format!("Schema field not found: {}", msg),
        PE::ComputeError(msg) => format!("Compute error: {}", msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        ErrorKind::Other => {
            let msg = err.to_string();
            if msg.contains("No space left") || msg.contains("space left") {
                return "No space left on device. Free up disk space and try again.".to_string();
            }
            if msg.contains("Is a directory") {
                return "Path is a directory, not a file.".to_string();
            }
            return if context.is_some() {
                format!("I/O error: {}", msg)
            } else {
                msg
            };
        }
        _ => err.to_string(),
    };

    if let Some(ctx) = context {
        if !ctx.is_empty() {
            format!("{} {}", base, ctx)
        } else {
            base
        }
    } else {
        base
    }
}

/// Walk an eyre report chain and produce the best user-facing message:
/// typed Polars/io matches win over the generic Display rendering.
pub fn user_message_from_report(report: &color_eyre::Report) -> String {
    for cause in report.chain() {
        if let Some(polars_err) = cause.downcast_ref::<PolarsError>() {
            return user_message_from_polars(polars_err);
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return user_message_from_io(io_err, None);
        }
    }
    report.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::PolarsError;

    #[test]
    fn polars_column_not_found_message() {
        let err = PolarsError::ColumnNotFound("foo".into());
        let msg = user_message_from_polars(&err);
        assert!(msg.contains("Column not found"));
        assert!(msg.contains("foo"));
    }

    #[test]
    fn io_not_found_message() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let msg = user_message_from_io(&err, None);
        assert!(msg.contains("not found"));
    }

    #[test]
    fn io_context_is_appended() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let msg = user_message_from_io(&err, Some("while reading data.csv"));
        assert!(msg.contains("Permission denied"));
        assert!(msg.contains("data.csv"));
    }

    #[test]
    fn report_chain_finds_polars_error() {
        let report =
            color_eyre::Report::new(PolarsError::ColumnNotFound("bar".into())).wrap_err("loading");
        let msg = user_message_from_report(&report);
        assert!(msg.contains("Column not found"));
    }

    #[test]
    fn report_without_known_cause_uses_display() {
        let report = color_eyre::eyre::eyre!("something else");
        assert_eq!(user_message_from_report(&report), "something else");
    }
}
