use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const STYLESHEET_NAME: &str = "styles.css";

pub const STYLESHEET: &str = "\
body { font-family: Arial, serif; }
table { table-layout: fixed; }
td.date {
    font-size: 140%;
    font-weight: 600;
    color: #FFFFFF;
    padding-left: 4px;
    background: #696969;
}
td.name, td.self_name {
    font-size: 11pt;
    font-weight: bold;
    text-align: right;
    vertical-align: text-top;
    padding: 3px 0 3px 20px;
    white-space: nowrap;
}
td.hour, td.self_hour {
    font-size: 11pt;
    font-weight: bold;
    vertical-align: text-top;
    padding: 3px 0;
}
td.name, td.hour { color: #6495ED; }
td.self_name, td.self_hour { color: #00CC00; }
td.text {
    font-size: 11pt;
    word-break: break-word;
}
";

/// Writes the HTML stylesheet into `dir` unless one is already there.
/// Returns the path when a file was created.
pub fn ensure_stylesheet(dir: &Path) -> Result<Option<PathBuf>> {
    let path = dir.join(STYLESHEET_NAME);
    if path.exists() {
        return Ok(None);
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    fs::write(&path, STYLESHEET).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn existing_stylesheet_is_left_alone() {
        let tmp = tempdir().expect("tempdir");
        let created = ensure_stylesheet(tmp.path()).expect("first");
        assert!(created.is_some());

        fs::write(tmp.path().join(STYLESHEET_NAME), "custom").expect("overwrite");
        assert!(ensure_stylesheet(tmp.path()).expect("second").is_none());
        assert_eq!(
            fs::read_to_string(tmp.path().join(STYLESHEET_NAME)).expect("read"),
            "custom"
        );
    }
}
