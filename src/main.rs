use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use icepack::{
    pack::pack, unpack::unpack, CompressOptions, DataFile, IceFile, IceVersion, WriteOptions,
};

#[derive(Parser)]
#[command(name = "icepack", version, about = "ICE game-asset archive tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print ICE archive info
    Info {
        /// File to inspect
        icefile: PathBuf,
        /// Print sizes in human-readable format
        #[arg(short = 'H', long)]
        human_readable: bool,
    },
    /// List files contained in an ICE archive
    List {
        /// File to inspect
        icefile: PathBuf,
        /// Prefix names with their group subdirectory
        #[arg(short, long)]
        groups: bool,
    },
    /// Extract files from an ICE archive
    Unpack {
        /// File to extract
        icefile: PathBuf,
        /// Output directory (defaults to "<icefile>.extracted")
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Use group1/group2 subdirectories
        #[arg(short, long)]
        groups: bool,
        /// Write whole records (headers included) instead of payloads
        #[arg(short, long)]
        raw: bool,
    },
    /// Pack files into a new ICE archive
    Pack {
        /// Files or directories to pack
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output archive path
        #[arg(short, long)]
        out: PathBuf,
        /// Compression: none, 0..9 (kraken level), kraken, or prs
        #[arg(short, long, default_value = "none", value_parser = parse_compression)]
        compression: CompressOptions,
        /// Encrypt both groups
        #[arg(short, long)]
        encrypt: bool,
        /// Archive format version
        #[arg(short = 'v', long, default_value = "4", value_parser = parse_version)]
        format_version: IceVersion,
        /// File name patterns routed to group 1
        #[arg(short = '1', long = "group1", num_args = 1..)]
        group1: Vec<String>,
        /// File name patterns to skip
        #[arg(short = 'i', long = "ignore", num_args = 1..)]
        ignore: Vec<String>,
    },
    /// Read an archive and write it back with new options
    Repack {
        /// Source archive
        icefile: PathBuf,
        /// Output archive path
        #[arg(short, long)]
        out: PathBuf,
        /// Compression: none, 0..9 (kraken level), kraken, or prs
        #[arg(short, long, default_value = "none", value_parser = parse_compression)]
        compression: CompressOptions,
        /// Encrypt both groups
        #[arg(short, long)]
        encrypt: bool,
        /// Archive format version
        #[arg(short = 'v', long, default_value = "4", value_parser = parse_version)]
        format_version: IceVersion,
    },
}

fn parse_compression(s: &str) -> Result<CompressOptions, String> {
    s.parse::<CompressOptions>().map_err(|e| e.to_string())
}

fn parse_version(s: &str) -> Result<IceVersion, String> {
    s.parse::<u32>()
        .ok()
        .and_then(IceVersion::from_u32)
        .ok_or_else(|| format!("unsupported version {s:?} (expected 3 or 4)"))
}

fn main() -> anyhow::Result<()> {
    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { icefile, human_readable } => {
            let ice = IceFile::open(&icefile)
                .with_context(|| format!("reading {}", icefile.display()))?;

            println!("Version: {}", ice.header.version);
            println!("Flags:   0x{:04x}", ice.header.flags);
            println!("Size:    {}", format_size(ice.header.file_size as u64, human_readable));

            if !ice.group1_files.is_empty() {
                print_group_info("Group 1:", &ice.group1_files, human_readable);
            }
            if !ice.group2_files.is_empty() {
                print_group_info("Group 2:", &ice.group2_files, human_readable);
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { icefile, groups } => {
            let ice = IceFile::open(&icefile)
                .with_context(|| format!("reading {}", icefile.display()))?;

            let (prefix1, prefix2) = if groups { ("group1/", "group2/") } else { ("", "") };
            for file in &ice.group1_files {
                println!("{prefix1}{}", file.name());
            }
            for file in &ice.group2_files {
                println!("{prefix2}{}", file.name());
            }
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { icefile, out, groups, raw } => {
            let ice = IceFile::open(&icefile)
                .with_context(|| format!("reading {}", icefile.display()))?;
            let out_dir = out.unwrap_or_else(|| icefile.with_extension("extracted"));

            for path in unpack(&ice, &out_dir, groups, raw)? {
                println!("{}", path.display());
            }
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { files, out, compression, encrypt, format_version, group1, ignore } => {
            let mut sink = File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            let options = WriteOptions { compression, encrypt };

            let (packed1, packed2) = pack(&mut sink, &files, format_version, options, &group1, &ignore)?;
            println!(
                "Packed {} file(s) ({} in group 1) → {}",
                packed1.len() + packed2.len(),
                packed1.len(),
                out.display(),
            );
        }

        // ── Repack ───────────────────────────────────────────────────────────
        Commands::Repack { icefile, out, compression, encrypt, format_version } => {
            let bytes = std::fs::read(&icefile)
                .with_context(|| format!("reading {}", icefile.display()))?;
            let mut sink = File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            let options = WriteOptions { compression, encrypt };

            icepack::repack(&mut bytes.as_slice(), &mut sink, format_version, options)?;
            println!("Repacked {} → {}", icefile.display(), out.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn print_group_info(title: &str, files: &[DataFile], humanize: bool) {
    let width = files.iter().map(|f| f.name().len()).max().unwrap_or(0);

    println!();
    println!("{title}");
    for file in files {
        println!(
            "  {:width$}  {}",
            file.name(),
            format_size(file.raw().len() as u64, humanize),
        );
    }
}

fn format_size(num: u64, humanize: bool) -> String {
    if !humanize {
        return num.to_string();
    }
    let mut n = num as f64;
    for unit in ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"] {
        if n < 1024.0 {
            return format!("{n:.1} {unit}B");
        }
        n /= 1024.0;
    }
    format!("{n:.1} YiB")
}
