//! `procedo validate`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use serde_json::json;

use procedo_core::Engine;
use procedo_core::procedure::definition::load_procedure_file;

use crate::state::AppState;

/// Problems found in one file. Empty means valid.
pub struct FileReport {
    pub path: PathBuf,
    pub code: Option<String>,
    pub problems: Vec<String>,
}

/// Check each file against the engine. Returns whether all were valid.
pub fn handle_validate(state: &AppState, files: &[PathBuf], json: bool) -> Result<bool> {
    let files = if files.is_empty() {
        yaml_files(state.repository.root())?
    } else {
        files.to_vec()
    };

    let reports: Vec<FileReport> = files
        .into_iter()
        .map(|path| check_file(&state.engine, path))
        .collect();
    let valid = reports.iter().all(|r| r.problems.is_empty());

    if json {
        let out: Vec<_> = reports
            .iter()
            .map(|r| {
                json!({
                    "path": r.path.display().to_string(),
                    "code": r.code,
                    "valid": r.problems.is_empty(),
                    "problems": r.problems,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(valid);
    }

    println!();
    if reports.is_empty() {
        println!("  {}", style("No procedure files found.").dim());
    }
    for report in &reports {
        let label = report
            .code
            .clone()
            .unwrap_or_else(|| report.path.display().to_string());
        if report.problems.is_empty() {
            println!("  {} {}", style("✓").green(), style(label).cyan());
        } else {
            println!("  {} {}", style("✗").red(), style(label).cyan());
            for problem in &report.problems {
                println!("      {problem}");
            }
        }
    }
    println!();
    Ok(valid)
}

pub fn check_file(engine: &Engine, path: PathBuf) -> FileReport {
    match load_procedure_file(&path) {
        Ok(definition) => FileReport {
            problems: engine.check_definition(&definition),
            code: Some(definition.code),
            path,
        },
        Err(e) => FileReport {
            problems: vec![e.to_string()],
            code: None,
            path,
        },
    }
}

/// Every `.yaml`/`.yml` file directly under `dir`, sorted. Unlike
/// discovery, unparseable files are included.
fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use procedo_infra::executor::DataExecutor;
    use procedo_infra::store::InMemoryRecordStore;

    fn engine() -> Engine {
        Engine::builder()
            .executor(DataExecutor::new(InMemoryRecordStore::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_check_file_reports_problems() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(
            &good,
            "code: good\ncommands:\n  - type: data.get\n    table: orders\n    id: \"=input.id\"\n",
        )
        .unwrap();
        let unknown = dir.path().join("unknown.yaml");
        std::fs::write(&unknown, "code: unknown\ncommands:\n  - type: fax.send\n").unwrap();
        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "code: [").unwrap();

        let engine = engine();
        assert!(check_file(&engine, good).problems.is_empty());

        let report = check_file(&engine, unknown);
        assert_eq!(report.code.as_deref(), Some("unknown"));
        assert!(report.problems.iter().any(|p| p.contains("'fax'")));

        let report = check_file(&engine, broken);
        assert!(report.code.is_none());
        assert_eq!(report.problems.len(), 1);
    }

    #[test]
    fn test_yaml_files_includes_only_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yml"), "").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = yaml_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert_eq!(names, ["a.yaml", "b.yml"]);
        assert!(yaml_files(&dir.path().join("missing")).unwrap().is_empty());
    }
}
