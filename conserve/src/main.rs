use std::io::Write;
use std::path::Path;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info, LevelFilter};

use carchive::ops::{self, FileKind};

mod cli;
use crate::cli::Cli;
use crate::cli::Commands;

mod config;
use crate::config::Config;

mod exitcode;
use crate::exitcode::ExitCode;

fn init_logging(verbose: u8, plain: bool) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // RUST_LOG, when set, wins over -v
    builder.parse_env(env_logger::Env::default());
    if plain {
        builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    }
    builder.init();
}

fn printproto(file: &Path) -> cbase::Result<ExitCode> {
    match ops::file_kind(file) {
        FileKind::Record(_) => {
            print!("{}", ops::printproto(file)?);
            Ok(ExitCode::Ok)
        }
        FileKind::DataFile => {
            error!("{} is a block data file and holds no record", file.display());
            Ok(ExitCode::CommandLine)
        }
        FileKind::Unknown => {
            error!("can't tell the record type from the file name {}", file.display());
            Ok(ExitCode::CommandLine)
        }
    }
}

fn run(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::CommandLine;
        }
    };

    let result = match cli.command {
        Commands::Init { archive } => ops::init(&archive).map(|_| ExitCode::Ok),
        Commands::Backup {
            base_dir,
            sources,
            archive,
        } => {
            let options = config.backup_options(base_dir);
            ops::backup(sources.as_slice(), &archive, &options).map(|stats| {
                info!(
                    "backed up {} files ({} bytes, {} compressed) in {} blocks",
                    stats.files, stats.plain_bytes, stats.compressed_bytes, stats.blocks
                );
                ExitCode::Ok
            })
        }
        Commands::Restore { archive, dest } => ops::restore(&archive, &dest).map(|stats| {
            info!("restored {} files ({} bytes)", stats.files, stats.bytes);
            ExitCode::Ok
        }),
        Commands::Validate { archive } => ops::validate(&archive).map(|report| {
            if report.has_problems() {
                for problem in &report.problems {
                    println!("{}", problem);
                }
                ExitCode::ProblemsNoted
            } else {
                ExitCode::Ok
            }
        }),
        Commands::Printproto { file } => printproto(&file),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            // Problems were logged when they were raised
            if e.problem().is_none() {
                error!("{}", e);
            }
            ExitCode::ProblemsStopped
        }
    }
}

fn main() -> process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Ok,
                _ => ExitCode::CommandLine,
            };
            return code.into();
        }
    };

    init_logging(cli.verbose, cli.plain_log);
    run(cli).into()
}

#[cfg(test)]
mod test_main {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn run_args(args: &[&str]) -> ExitCode {
        let mut argv = vec!["conserve"];
        argv.extend_from_slice(args);
        run(Cli::try_parse_from(argv).unwrap())
    }

    fn arg(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn commands_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("fileA"), b"A").unwrap();
        fs::write(src.join("fileB"), b"BB").unwrap();
        let archive = tmp.path().join("archive");
        let out = tmp.path().join("outDir");

        assert_eq!(run_args(&["init", arg(&archive)]), ExitCode::Ok);
        assert_eq!(run_args(&["init", arg(&archive)]), ExitCode::ProblemsStopped);
        assert_eq!(
            run_args(&["backup", "-C", arg(&src), "fileA", "fileB", arg(&archive)]),
            ExitCode::Ok
        );
        assert_eq!(run_args(&["restore", arg(&archive), arg(&out)]), ExitCode::Ok);
        assert_eq!(fs::read(out.join("fileB")).unwrap(), b"BB");
        assert_eq!(run_args(&["validate", arg(&archive)]), ExitCode::Ok);

        let head = archive.join("CONSERVE-ARCHIVE");
        assert_eq!(run_args(&["printproto", arg(&head)]), ExitCode::Ok);
        let data = archive.join("b0000").join("d000000");
        assert_eq!(run_args(&["printproto", arg(&data)]), ExitCode::CommandLine);
    }

    #[test]
    fn validate_notes_problems() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("archive");
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("f"), b"content").unwrap();
        run_args(&["init", arg(&archive)]);
        run_args(&["backup", "-C", arg(&src), "f", arg(&archive)]);
        fs::write(archive.join("b0000").join("d000000"), b"junk").unwrap();

        assert_eq!(run_args(&["validate", arg(&archive)]), ExitCode::ProblemsNoted);
    }

    #[test]
    fn bad_config_is_a_command_line_error() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("conserve.toml");
        fs::write(&config, "max_block_bytes = \"lots\"\n").unwrap();
        let archive = tmp.path().join("archive");

        assert_eq!(
            run_args(&["--config", arg(&config), "init", arg(&archive)]),
            ExitCode::CommandLine
        );
        assert!(!archive.exists());
    }

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Ok as u8, 0);
        assert_eq!(ExitCode::Differences as u8, 1);
        assert_eq!(ExitCode::ProblemsNoted as u8, 2);
        assert_eq!(ExitCode::ProblemsStopped as u8, 3);
        assert_eq!(ExitCode::CommandLine as u8, 4);
    }
}
