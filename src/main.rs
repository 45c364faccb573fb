mod token;
mod lexer;
mod registry;
mod ast;
mod vars;
mod scope;
mod parser;
mod analyzer;
mod codegen;
mod dump;
mod output;
mod options;
mod error;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;

use crate::error::{CompileError, CompileResult};
use crate::options::Options;
use crate::registry::CommandRegistry;
use crate::vars::VarTable;

/// MCJava Compiler - compiles MCJava scripts to Minecraft datapack function files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input MCJava source file
    input: PathBuf,

    /// Write <stem>-token.dump
    #[arg(long)]
    dump_tokens: bool,

    /// Write <stem>-cmds.dump listing registry roots
    #[arg(long)]
    dump_cmds: bool,

    /// Write <stem>-parse-tree.dump
    #[arg(long)]
    dump_parse_tree: bool,

    /// Write <stem>-analyzer-tree.dump
    #[arg(long)]
    dump_analyzer_tree: bool,

    /// Run through the analyzer only; skip generation
    #[arg(long)]
    analysis: bool,

    /// Disable constant folding in the analyzer
    #[arg(long)]
    disable_constant_folding: bool,

    /// Retain declarations whose variable is never read
    #[arg(long)]
    keep_unused_vars: bool,

    /// Suppress informational output; errors still go to stderr
    #[arg(long)]
    silent: bool,

    /// Path to the command-registry JSON
    #[arg(long, default_value = "./mcdoc/commands.json")]
    mcdoc_path: String,

    /// Namespace prefix used in function references
    #[arg(long, default_value = "mcjava")]
    dp_prefix: String,

    /// Path segment under the namespace
    #[arg(long, default_value = "")]
    dp_path: String,
}

impl Args {
    fn to_options(&self) -> Options {
        let mut options = Options {
            dump_tokens: self.dump_tokens,
            dump_cmds: self.dump_cmds,
            dump_parse_tree: self.dump_parse_tree,
            dump_analyzer_tree: self.dump_analyzer_tree,
            only_analysis: self.analysis,
            constant_folding: !self.disable_constant_folding,
            remove_unused_vars: !self.keep_unused_vars,
            silent: self.silent,
            mcdoc_path: self.mcdoc_path.clone(),
            dp_prefix: self.dp_prefix.clone(),
            dp_path: self.dp_path.clone(),
        };
        options.normalize_dp_path();
        options
    }
}

fn main() {
    let args = Args::parse();
    let options = args.to_options();

    if let Err(e) = compile(&args.input, &options) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn compile(input: &Path, options: &Options) -> CompileResult<()> {
    let total_start = Instant::now();

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CompileError::Io(format!("Invalid input path: {}", input.display())))?
        .to_string();
    let base_dir = input.parent().map(Path::to_path_buf).unwrap_or_default();

    let source = std::fs::read_to_string(input)
        .map_err(|e| CompileError::Io(format!("Cannot read {}: {}", input.display(), e)))?;

    let registry_start = Instant::now();
    let registry = CommandRegistry::load(&options.mcdoc_path)?;
    let registry_time = registry_start.elapsed();

    if options.dump_cmds {
        let mut listing = String::new();
        for root in registry.roots() {
            listing.push_str(root);
            listing.push('\n');
        }
        output::write_text(&base_dir.join(format!("{}-cmds.dump", stem)), &listing)?;
    }

    let lex_start = Instant::now();
    let tokens = lexer::lex(&source, &registry)?;
    let lex_time = lex_start.elapsed();

    if options.dump_tokens {
        output::write_text(
            &base_dir.join(format!("{}-token.dump", stem)),
            &dump::token_dump(&tokens),
        )?;
    }

    let parse_start = Instant::now();
    let mut root = parser::parse(tokens)?;
    let parse_time = parse_start.elapsed();

    if options.dump_parse_tree {
        output::write_text(
            &base_dir.join(format!("{}-parse-tree.dump", stem)),
            &dump::tree_dump(&root, &VarTable::new()),
        )?;
    }

    let analyze_start = Instant::now();
    let mut vars = analyzer::analyze(&mut root, options)?;
    let analyze_time = analyze_start.elapsed();

    if options.dump_analyzer_tree {
        output::write_text(
            &base_dir.join(format!("{}-analyzer-tree.dump", stem)),
            &dump::tree_dump(&root, &vars),
        )?;
    }

    let generate_time = if options.only_analysis {
        None
    } else {
        let generate_start = Instant::now();
        let out_dir = base_dir.join(&stem);
        codegen::generate(&root, &out_dir, options, &mut vars)?;
        Some((generate_start.elapsed(), out_dir))
    };

    if !options.silent {
        println!("✓ Compilation successful!");
        if let Some((_, out_dir)) = &generate_time {
            println!("  Functions generated at: {}", out_dir.display());
        }
        println!("Time parsing mcdoc: {:.2}s", registry_time.as_secs_f64());
        println!("Time tokenizing: {:.2}s", lex_time.as_secs_f64());
        println!("Time parsing: {:.2}s", parse_time.as_secs_f64());
        println!("Time analyzing: {:.2}s", analyze_time.as_secs_f64());
        if let Some((elapsed, _)) = &generate_time {
            println!("Time generating: {:.2}s", elapsed.as_secs_f64());
        }
        println!("Time taken: {:.2}s", total_start.elapsed().as_secs_f64());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_commands_json(dir: &Path) -> PathBuf {
        let doc = json!({
            "children": {
                "say": { "required_level": 0 }
            }
        });
        let path = dir.join("commands.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    #[test]
    fn compiles_a_source_file_end_to_end() {
        let dir = TempDir::new().unwrap();
        let mcdoc = write_commands_json(dir.path());

        let source_path = dir.path().join("hello.mcjava");
        std::fs::write(&source_path, "x = 10\nsay x\n").unwrap();

        let options = Options {
            silent: true,
            mcdoc_path: mcdoc.to_str().unwrap().to_string(),
            ..Options::default()
        };
        compile(&source_path, &options).unwrap();

        let generated = dir.path().join("hello").join("scope_0.func");
        let contents = std::fs::read_to_string(generated).unwrap();
        assert_eq!(contents, "tellraw @a [{\"text\":\"10\"},]\n");
    }

    #[test]
    fn dump_flags_write_side_files() {
        let dir = TempDir::new().unwrap();
        let mcdoc = write_commands_json(dir.path());

        let source_path = dir.path().join("dumps.mcjava");
        std::fs::write(&source_path, "x = 1\nsay x\n").unwrap();

        let options = Options {
            silent: true,
            dump_tokens: true,
            dump_cmds: true,
            dump_parse_tree: true,
            dump_analyzer_tree: true,
            mcdoc_path: mcdoc.to_str().unwrap().to_string(),
            ..Options::default()
        };
        compile(&source_path, &options).unwrap();

        let token_dump = std::fs::read_to_string(dir.path().join("dumps-token.dump")).unwrap();
        assert!(token_dump.starts_with("IDENTIFIER -> x\n"));

        let cmds_dump = std::fs::read_to_string(dir.path().join("dumps-cmds.dump")).unwrap();
        assert_eq!(cmds_dump, "say\n");

        assert!(dir.path().join("dumps-parse-tree.dump").exists());
        let analyzer_dump =
            std::fs::read_to_string(dir.path().join("dumps-analyzer-tree.dump")).unwrap();
        assert!(analyzer_dump.contains("[USED]"));
    }

    #[test]
    fn analysis_only_skips_generation() {
        let dir = TempDir::new().unwrap();
        let mcdoc = write_commands_json(dir.path());

        let source_path = dir.path().join("check.mcjava");
        std::fs::write(&source_path, "x = 1\nsay x\n").unwrap();

        let options = Options {
            silent: true,
            only_analysis: true,
            mcdoc_path: mcdoc.to_str().unwrap().to_string(),
            ..Options::default()
        };
        compile(&source_path, &options).unwrap();
        assert!(!dir.path().join("check").exists());
    }

    #[test]
    fn missing_source_reports_io_error() {
        let dir = TempDir::new().unwrap();
        let mcdoc = write_commands_json(dir.path());
        let options = Options {
            silent: true,
            mcdoc_path: mcdoc.to_str().unwrap().to_string(),
            ..Options::default()
        };
        let err = compile(&dir.path().join("missing.mcjava"), &options).unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }
}
