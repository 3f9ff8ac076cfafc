use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use mdtasks::config::ProjectConfigFile;
use mdtasks::{MarkdownTaskParser, ParseContext, TaskParserConfig, TimeParsingService};

#[derive(Debug, Parser)]
#[command(
    name = "mdtasks",
    about = "Extract tasks and dates from Markdown checklists",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse Markdown files and print their tasks.
    Parse(ParseArgs),

    /// Extract dates and clock times from a piece of text.
    Time(TimeArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Markdown files or directories containing Markdown files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
    /// Emit the flat legacy record shape.
    #[arg(long)]
    legacy: bool,
    /// Parser configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Extra file metadata as KEY=VALUE; overrides the file's frontmatter.
    #[arg(long = "meta", value_parser = parse_key_value)]
    meta: Vec<(String, serde_json::Value)>,
    /// Project config values as KEY=VALUE; overrides any project config file.
    #[arg(long = "project-meta", value_parser = parse_key_value)]
    project_meta: Vec<(String, serde_json::Value)>,
    /// Reference date for relative expressions. Defaults to today.
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Debug, Args)]
struct TimeArgs {
    /// Text to scan.
    text: String,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
    /// Reference date for relative expressions. Defaults to today.
    #[arg(long)]
    today: Option<NaiveDate>,
    /// Parser configuration (JSON); only its `timeParsing` section is used.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Time(args) => handle_time(args),
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Warn);
    builder.parse_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}

fn load_config(path: Option<&Path>) -> Result<TaskParserConfig> {
    match path {
        Some(path) => TaskParserConfig::load(path),
        None => Ok(TaskParserConfig::default()),
    }
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let ParseArgs {
        inputs,
        json,
        legacy,
        config,
        meta,
        project_meta,
        today,
    } = args;
    let config = load_config(config.as_deref())?;
    let expanded = expand_inputs(&inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no Markdown files found in the provided inputs");
    }

    let parser = MarkdownTaskParser::new(config);
    let mut parsed = Vec::new();
    for path in expanded {
        log::info!("parsing {:?}", path);
        let text = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        let ctx = build_context(&path, &text, &meta, &project_meta, today, &parser)?;
        let value = if legacy {
            serde_json::to_value(parser.parse_legacy(&text, &ctx))?
        } else {
            serde_json::to_value(parser.parse(&text, &ctx))?
        };
        parsed.push((path, value));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            tasks: &'a serde_json::Value,
        }

        let payload: Vec<JsonOutput<'_>> = parsed
            .iter()
            .map(|(path, tasks)| JsonOutput {
                path: path.display().to_string(),
                tasks,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (idx, (path, tasks)) in parsed.iter().enumerate() {
            if parsed.len() > 1 {
                println!("== {} ==", path.display());
            }
            println!("{:#?}", tasks);
            if parsed.len() > 1 && idx + 1 < parsed.len() {
                println!();
            }
        }
    }
    Ok(())
}

fn handle_time(args: TimeArgs) -> Result<()> {
    let TimeArgs {
        text,
        json,
        today,
        config,
    } = args;
    let config = load_config(config.as_deref())?;
    let service = TimeParsingService::new(config.time_parsing);
    let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
    let result = service.parse_time_expressions(&text, today);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{:#?}", result);
    }
    Ok(())
}

/* ------------------------------ Context ------------------------------ */

fn build_context(
    path: &Path,
    text: &str,
    meta: &[(String, serde_json::Value)],
    project_meta: &[(String, serde_json::Value)],
    today: Option<NaiveDate>,
    parser: &MarkdownTaskParser,
) -> Result<ParseContext> {
    let mut ctx = ParseContext::new(path.display().to_string());
    if let Some(today) = today {
        ctx = ctx.with_today(today);
    }

    let mut file_metadata = frontmatter(text);
    file_metadata.extend(meta.iter().cloned());
    if !file_metadata.is_empty() {
        ctx = ctx.with_file_metadata(file_metadata);
    }

    let project_file = &parser.config().project_config.config_file;
    let mut project_data = match find_project_file(path, project_file) {
        Some(found) => {
            log::debug!("project config {:?}", found);
            let body =
                fs::read_to_string(&found).with_context(|| format!("reading {:?}", found))?;
            project_data(&body)
        }
        None => IndexMap::new(),
    };
    project_data.extend(project_meta.iter().cloned());
    if !project_data.is_empty() {
        ctx = ctx.with_project_config(project_data);
    }
    Ok(ctx)
}

/// Nearest project config file, in the file's directory or (when enabled) any ancestor.
fn find_project_file(path: &Path, config: &ProjectConfigFile) -> Option<PathBuf> {
    if !config.enabled {
        return None;
    }
    let mut dir = path.parent();
    while let Some(d) = dir {
        let candidate = d.join(&config.file_name);
        if candidate.is_file() && candidate != path {
            return Some(candidate);
        }
        if !config.search_recursively {
            break;
        }
        dir = d.parent();
    }
    None
}

/// YAML mapping between leading `---` fences. Malformed blocks are ignored with a warning.
fn frontmatter(text: &str) -> IndexMap<String, serde_json::Value> {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("---") {
        return IndexMap::new();
    }
    let block: Vec<&str> = lines.take_while(|l| l.trim() != "---").collect();
    yaml_mapping(&block.join("\n")).unwrap_or_else(|e| {
        log::warn!("ignoring malformed frontmatter: {e}");
        IndexMap::new()
    })
}

/// A project file may carry frontmatter or be a bare YAML mapping.
fn project_data(body: &str) -> IndexMap<String, serde_json::Value> {
    let data = frontmatter(body);
    if !data.is_empty() {
        return data;
    }
    yaml_mapping(body).unwrap_or_else(|e| {
        log::debug!("project file is not a YAML mapping: {e}");
        IndexMap::new()
    })
}

fn yaml_mapping(text: &str) -> Result<IndexMap<String, serde_json::Value>, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(IndexMap::new());
    }
    let parsed: Option<IndexMap<String, serde_json::Value>> = serde_yaml::from_str(text)?;
    Ok(parsed.unwrap_or_default())
}

/// `KEY=VALUE` where VALUE is read as a YAML scalar or flow list.
fn parse_key_value(s: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in {s:?}");
    }
    let value = value.trim();
    let parsed = match serde_yaml::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Null) | Err(_) => serde_json::Value::String(value.to_string()),
        Ok(v) => v,
    };
    Ok((key.to_string(), parsed))
}

/* ------------------------------ Inputs ------------------------------ */

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Files and directories named on the command line, flattened to unique Markdown files.
/// Directory contents come back sorted; symlinks inside directories are not followed.
fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for path in paths {
        let root = fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let found = if root.is_dir() {
            log::debug!("scanning directory {:?}", root);
            markdown_under(&root)?
        } else if is_markdown(&root) {
            vec![root]
        } else {
            anyhow::bail!("{:?} is not a .md file", root);
        };
        files.extend(found.into_iter().filter(|f| seen.insert(f.clone())));
    }
    Ok(files)
}

fn markdown_under(root: &Path) -> Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut found = Vec::new();
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).with_context(|| format!("listing {:?}", dir))?;
        for entry in entries {
            let entry = entry?;
            // DirEntry::file_type does not follow links, so symlinks match neither arm.
            let kind = entry.file_type()?;
            let path = entry.path();
            if kind.is_dir() {
                pending.push(path);
            } else if kind.is_file() && is_markdown(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn expand_inputs_walks_directories_in_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        fs::create_dir_all(root.join("b")).expect("mkdir b");
        fs::write(root.join("b/two.md"), "- [ ] two").expect("write two");
        fs::write(root.join("a.md"), "- [ ] one").expect("write one");
        fs::write(root.join("notes.txt"), "- [ ] skip").expect("write txt");

        let files = expand_inputs(&[root.to_path_buf()]).expect("expand");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(fs::canonicalize(root).unwrap()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.md"), PathBuf::from("b/two.md")]);
    }

    #[cfg(unix)]
    #[test]
    fn expand_inputs_skips_symlinked_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(tmp.path()).expect("canonicalize");
        fs::write(root.join("a.md"), "- [ ] one").expect("write");
        std::os::unix::fs::symlink(&root, root.join("loop")).expect("symlink");

        let files = expand_inputs(&[root.clone()]).expect("expand");
        assert_eq!(files, vec![root.join("a.md")]);
    }

    #[test]
    fn expand_inputs_rejects_other_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("todo.org");
        fs::write(&file, "* TODO x").expect("write");
        assert!(expand_inputs(&[file]).is_err());
    }

    #[test]
    fn frontmatter_pairs() {
        let text = "---\nproject: Apollo\npriority: 2\ntags: [a, \"b\"]\n---\n- [ ] x\n";
        let fm = frontmatter(text);
        assert_eq!(fm["project"], json!("Apollo"));
        assert_eq!(fm["priority"], json!(2));
        assert_eq!(fm["tags"], json!(["a", "b"]));
        assert!(frontmatter("- [ ] no frontmatter").is_empty());
    }

    #[test]
    fn frontmatter_block_lists_quotes_and_comments() {
        let text = "---\ntags:\n  - work\n  - home\nproject: \"Apollo: Phase 2\"\ndue: 2025-08-15 # deadline\n---\n";
        let fm = frontmatter(text);
        assert_eq!(fm["tags"], json!(["work", "home"]));
        assert_eq!(fm["project"], json!("Apollo: Phase 2"));
        assert_eq!(fm["due"], json!("2025-08-15"));
        assert_eq!(fm.keys().collect::<Vec<_>>(), vec!["tags", "project", "due"]);
    }

    #[test]
    fn malformed_or_empty_frontmatter_is_ignored() {
        assert!(frontmatter("---\ntags: [a, b\n---\n- [ ] x").is_empty());
        assert!(frontmatter("---\n---\n- [ ] x").is_empty());
        assert!(frontmatter("---\n# only a comment\n---\n").is_empty());
    }

    #[test]
    fn project_data_accepts_bare_yaml_or_frontmatter() {
        assert_eq!(project_data("project: Apollo\n")["project"], json!("Apollo"));
        assert_eq!(project_data("---\nproject: Zeus\n---\n# Notes\n")["project"], json!("Zeus"));
        assert!(project_data("# Notes\nJust prose here.\n").is_empty());
    }

    #[test]
    fn key_value_arguments() {
        assert_eq!(parse_key_value("done=true").unwrap(), ("done".into(), json!(true)));
        assert_eq!(parse_key_value("area = ops").unwrap(), ("area".into(), json!("ops")));
        assert_eq!(parse_key_value("tags=[a, b]").unwrap(), ("tags".into(), json!(["a", "b"])));
        assert_eq!(parse_key_value("note=").unwrap(), ("note".into(), json!("")));
        assert_eq!(parse_key_value("odd=[x").unwrap(), ("odd".into(), json!("[x")));
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn project_file_is_found_in_ancestors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        fs::create_dir_all(root.join("deep/er")).expect("mkdir");
        fs::write(root.join("project.md"), "project: Apollo\n").expect("write project");
        let note = root.join("deep/er/note.md");
        fs::write(&note, "- [ ] Launch").expect("write note");

        let shallow = ProjectConfigFile::default();
        assert_eq!(find_project_file(&note, &shallow), None);

        let recursive = ProjectConfigFile {
            search_recursively: true,
            ..ProjectConfigFile::default()
        };
        assert_eq!(find_project_file(&note, &recursive), Some(root.join("project.md")));

        let parser = MarkdownTaskParser::new(TaskParserConfig::default().with_project_config(
            mdtasks::config::ProjectConfig {
                config_file: recursive,
                ..Default::default()
            },
        ));
        let ctx = build_context(&note, "- [ ] Launch", &[], &[], None, &parser).expect("ctx");
        let tasks = parser.parse("- [ ] Launch", &ctx);
        assert_eq!(tasks[0].tg_project.as_ref().map(|p| p.name.as_str()), Some("Apollo"));
    }
}
