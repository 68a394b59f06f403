use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// An explicit DSN wins; otherwise a SQLite file under `<data_dir>/db`.
pub(crate) fn resolve_dsn(
    input: Option<&str>,
    data_dir: &str,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    if let Some(input) = input.map(str::trim).filter(|input| !input.is_empty()) {
        ensure_sqlite_file(input)?;
        return Ok(input.to_string());
    }

    let db_path = PathBuf::from(data_dir).join("db").join("chatwire.db");
    let db_path = db_path.to_string_lossy();
    let dsn = match db_path.strip_prefix('/') {
        Some(absolute) => format!("sqlite:///{absolute}"),
        None => format!("sqlite://{db_path}"),
    };
    ensure_sqlite_file(&dsn)?;
    Ok(dsn)
}

/// Creates the database file and its parent directory for file-backed
/// SQLite DSNs. Other schemes and in-memory databases are left alone.
fn ensure_sqlite_file(dsn: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let Some(rest) = sqlite_path(dsn) else {
        return Ok(());
    };
    let path = PathBuf::from(rest);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
    }
    Ok(())
}

fn sqlite_path(dsn: &str) -> Option<&str> {
    let rest = dsn.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    if rest.starts_with(":memory:") || rest.starts_with("memory:") {
        return None;
    }
    rest.split('?').next().filter(|path| !path.is_empty())
}
