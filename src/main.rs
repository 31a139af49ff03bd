use clap::{Parser, Subcommand};
use exefs::superblock::{Superblock, SECTION_COUNT};
use exefs::{create, extract, is_exefs_file, CreateOptions, ExeFsError, ExtractOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "exefstool", about = "Extract and rebuild ExeFS section containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every section of a container into a directory
    Extract {
        container: PathBuf,
        /// Output directory (created if absent)
        #[arg(short = 'C', long)]
        dir: PathBuf,
        /// Export the raw superblock to this file
        #[arg(long)]
        header: Option<PathBuf>,
        /// Decompress the code section (backward LZ77)
        #[arg(short, long)]
        uncompress: bool,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Rebuild a container from a directory and a sidecar header
    Create {
        container: PathBuf,
        /// Directory holding the section files
        #[arg(short = 'C', long)]
        dir: PathBuf,
        /// Sidecar header exported by a previous extraction
        #[arg(long)]
        header: PathBuf,
        /// Compress the code section (backward LZ77)
        #[arg(short, long)]
        compress: bool,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Report whether a file looks like an ExeFS container
    Check { container: PathBuf },
    /// Print the section table of a container
    Info { container: PathBuf },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> exefs::Result<ExitCode> {
    match Cli::parse().command {
        Commands::Extract { container, dir, header, uncompress, verbose } => {
            let options = ExtractOptions {
                header_path: header,
                decompress_code: uncompress,
                verbose,
                ..ExtractOptions::default()
            };
            extract(&container, &dir, &options)?;
        }

        Commands::Create { container, dir, header, compress, verbose } => {
            let mut options = CreateOptions::new(header);
            options.compress_code = compress;
            options.verbose = verbose;
            create(&container, &dir, &options)?;
        }

        Commands::Check { container } => {
            if is_exefs_file(&container) {
                println!("{}: ExeFS container", container.display());
            } else {
                println!("{}: not an ExeFS container", container.display());
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Info { container } => info(&container)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn info(container: &Path) -> exefs::Result<()> {
    let mut file = std::fs::File::open(container).map_err(|source| ExeFsError::Open {
        path: container.to_owned(),
        source,
    })?;
    let sb = Superblock::read_lenient(&mut file)?;
    println!("{:<10} {:>10} {:>10}  sha256", "name", "offset", "size");
    for index in 0..SECTION_COUNT {
        let section = &sb.sections[index];
        if section.is_empty() {
            continue;
        }
        println!(
            "{:<10} {:>#10x} {:>#10x}  {}",
            section.name_lossy(),
            section.offset,
            section.size,
            hex::encode(sb.digest(index)),
        );
    }
    Ok(())
}
