use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use interpreter::{CompileArgs, MemoryResolver, RuntimeValue, compile, compile_sync};
use razor::{ErrorKind, ParsedSectionRegistry, RazorError};

use crate::model;

const TEST_SUFFIX: &str = ".test.raz";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Data model passed to the template.
    #[serde(default)]
    pub model: Option<toml::Value>,

    /// Partial and layout views, by name.
    #[serde(default)]
    pub partials: BTreeMap<String, String>,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Substring the error's Display string must contain.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected error kind, by variant name (e.g. "SectionIsNotFound").
    #[serde(default)]
    pub expect_error_kind: Option<String>,

    /// If true, the test expects scanning the template to fail.
    #[serde(default)]
    pub expect_parse_error: bool,

    /// Which compile entry point to use.
    #[serde(default)]
    pub mode: Mode,
}

/// Parse a `.test.raz` file into its TOML config and template source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}'); // strip BOM

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest_start = close_pos + 4; // skip \n---
    let source = after_open[rest_start..]
        .strip_prefix("\r\n")
        .or_else(|| after_open[rest_start..].strip_prefix('\n'))
        .unwrap_or(&after_open[rest_start..]);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

/// Variant name of an error kind, as written in `expect_error_kind`.
fn kind_name(kind: &ErrorKind) -> String {
    let debug = format!("{:?}", kind);
    debug
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_string()
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    // 1. Read file
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("cannot read file: {}", e)),
            };
        }
    };

    // 2. Parse frontmatter
    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("frontmatter error: {}", e)),
            };
        }
    };

    let description = config.description.clone();
    let file_path = path.display().to_string();
    log::debug!("running {} ({:?} mode)", file_path, config.mode);

    // 3. Handle expect_parse_error
    if config.expect_parse_error {
        let mut sections = ParsedSectionRegistry::new();
        return TestResult {
            path: path.to_path_buf(),
            description,
            outcome: match razor::parse(source, &file_path, &mut sections) {
                Err(_) => TestOutcome::Pass,
                Ok(_) => TestOutcome::Fail("expected parse error, but parsing succeeded".into()),
            },
        };
    }

    // 4. Render
    let resolver = config
        .partials
        .iter()
        .fold(MemoryResolver::new(), |resolver, (name, view)| {
            resolver.with(name.as_str(), view.as_str())
        });
    let model = config
        .model
        .as_ref()
        .map(model::from_toml)
        .unwrap_or(RuntimeValue::Undefined);
    let args = CompileArgs::new(source)
        .file_path(file_path.as_str())
        .model(model)
        .resolver(&resolver);

    let result = match config.mode {
        Mode::Sync => compile_sync(args),
        Mode::Async => {
            let outcome = RefCell::new(None);
            compile(args, |result| *outcome.borrow_mut() = Some(result));
            match outcome.into_inner() {
                Some(result) => result,
                None => {
                    return TestResult {
                        path: path.to_path_buf(),
                        description,
                        outcome: TestOutcome::Fail("rendering did not complete".into()),
                    };
                }
            }
        }
    };

    // 5. Check error/output expectations
    let outcome = match check_result(&config, result) {
        Some(reason) => TestOutcome::Fail(reason),
        None => TestOutcome::Pass,
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Compare a render result with the expectations. Returns `Some(reason)` on mismatch.
fn check_result(config: &TestConfig, result: Result<String, RazorError>) -> Option<String> {
    let expects_error = config.expect_error.is_some() || config.expect_error_kind.is_some();
    match result {
        Err(error) if expects_error => {
            let err_str = error.to_string();
            if let Some(expected) = &config.expect_error {
                if !err_str.contains(expected.as_str()) {
                    return Some(format!(
                        "expected error containing \"{}\", got: {}",
                        expected, err_str
                    ));
                }
            }
            if let Some(expected) = &config.expect_error_kind {
                let actual = kind_name(&error.kind);
                if actual != *expected {
                    return Some(format!(
                        "expected error kind {}, got {}: {}",
                        expected, actual, err_str
                    ));
                }
            }
            None
        }
        Err(error) => Some(format!("unexpected error: {}", error)),
        Ok(_) if expects_error => Some("expected an error, but rendering succeeded".into()),
        Ok(actual) => {
            let expected = config.expect_output.as_deref()?;
            let actual_trimmed = actual.trim();
            let expected_trimmed = expected.trim();
            if actual_trimmed == expected_trimmed {
                None
            } else {
                Some(format!(
                    "output mismatch\n  expected: {}\n  actual:   {}",
                    expected_trimmed, actual_trimmed
                ))
            }
        }
    }
}

/// Discover `.test.raz` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
/// Returns a BTreeMap so categories are sorted alphabetically.
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    // Sort files within each category
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(TEST_SUFFIX) {
                let category = path
                    .parent()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                out.entry(category).or_default().push(path);
            }
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn bold(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[1m{}\x1b[0m", s)
    }
}

/// Run all `.test.raz` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    // Single file mode ignores categories
    if path.is_file() {
        let result = run_single_test(path);
        let label = result
            .description
            .as_deref()
            .unwrap_or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("?")
            });
        return match &result.outcome {
            TestOutcome::Pass => {
                eprintln!("  {}  {}", pass_label(no_color), label);
                eprintln!();
                eprintln!(
                    "test result: {}. 1 passed, 0 failed",
                    if no_color { "ok" } else { "\x1b[32mok\x1b[0m" }
                );
                0
            }
            TestOutcome::Fail(reason) => {
                eprintln!("  {}  {}", fail_label(no_color), label);
                eprintln!();
                eprintln!("failures:");
                eprintln!();
                eprintln!("  --- {} ---", path.display());
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
                eprintln!();
                eprintln!("test result: {}. 0 passed, 1 failed (of 1)",
                    if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" });
                1
            }
        };
    }

    let all_categories = discover_categorized(path);
    log::debug!(
        "discovered {} categories under {}",
        all_categories.len(),
        path.display()
    );

    if all_categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    // Filter categories if specified
    let run_categories: BTreeMap<&str, &Vec<PathBuf>> = if categories.is_empty() {
        all_categories.iter().map(|(k, v)| (k.as_str(), v)).collect()
    } else {
        let mut filtered = BTreeMap::new();
        for requested in categories {
            let req = requested.trim_matches('/');
            let mut found = false;
            for (cat, files) in &all_categories {
                if cat == req || cat.starts_with(&format!("{}/", req)) {
                    filtered.insert(cat.as_str(), files);
                    found = true;
                }
            }
            if !found {
                eprintln!(
                    "warning: category '{}' not found (available: {})",
                    req,
                    all_categories
                        .keys()
                        .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        filtered
    };

    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        // Print category header
        let header = if cat.is_empty() {
            "(root)".to_string()
        } else {
            cat.to_string()
        };
        eprintln!();
        eprintln!("{}", bold(&header, no_color));

        for file in *files {
            let result = run_single_test(file);
            let label = result
                .description
                .as_deref()
                .unwrap_or_else(|| {
                    file.file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("?")
                });

            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", pass_label(no_color), label);
                }
                TestOutcome::Fail(_) => {
                    failed += 1;
                    eprintln!("  {}  {}", fail_label(no_color), label);
                    failures.push(result);
                }
            }
        }
    }

    // Print failure details
    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    // Summary
    eprintln!();
    if failed == 0 {
        if no_color {
            eprintln!("test result: ok. {} passed, 0 failed", passed);
        } else {
            eprintln!("test result: \x1b[32mok\x1b[0m. {} passed, 0 failed", passed);
        }
        0
    } else {
        let total = passed + failed;
        if no_color {
            eprintln!(
                "test result: FAILED. {} passed, {} failed (of {})",
                passed, failed, total
            );
        } else {
            eprintln!(
                "test result: \x1b[31mFAILED\x1b[0m. {} passed, {} failed (of {})",
                passed, failed, total
            );
        }
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_front_matter_from_template() {
        let content =
            "---\ndescription = \"hello\"\nexpect_output = \"<p>hi</p>\"\n---\n<p>hi</p>\n";
        let (config, source) = parse_test_file(content).unwrap();
        assert_eq!(config.description.as_deref(), Some("hello"));
        assert_eq!(config.expect_output.as_deref(), Some("<p>hi</p>"));
        assert_eq!(config.mode, Mode::Sync);
        assert_eq!(source, "<p>hi</p>\n");
    }

    #[test]
    fn reads_partials_and_mode() {
        let content = "---\nmode = \"async\"\n[partials]\nLayout = \"[@Html.body()]\"\n---\nx";
        let (config, source) = parse_test_file(content).unwrap();
        assert_eq!(config.mode, Mode::Async);
        assert_eq!(config.partials["Layout"], "[@Html.body()]");
        assert_eq!(source, "x");
    }

    #[test]
    fn rejects_missing_delimiters() {
        assert!(parse_test_file("<p>no front matter</p>").is_err());
        assert!(parse_test_file("---\ndescription = \"x\"\n").is_err());
    }

    #[test]
    fn runs_bundled_cases() {
        let cases = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/cases");
        for files in discover_categorized(&cases).values() {
            for file in files {
                if let TestOutcome::Fail(reason) = run_single_test(file).outcome {
                    panic!("{}: {}", file.display(), reason);
                }
            }
        }
        assert_eq!(run_tests(&cases, true, &["layouts".to_string()]), 0);
    }

    #[test]
    fn kind_name_is_the_variant() {
        let kind = ErrorKind::SectionIsNotFound {
            name: "S".into(),
            requested_by: "page.raz".into(),
        };
        assert_eq!(kind_name(&kind), "SectionIsNotFound");
    }
}
