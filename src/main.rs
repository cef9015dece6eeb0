use std::io::{BufRead, Write as _};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use btrfs_forensics::compress::DecompressorRegistry;
use btrfs_forensics::image::Image;
use btrfs_forensics::key::{self, split_unique_inode};
use btrfs_forensics::partition::{self, PartitionScheme};
use btrfs_forensics::passwd;
use btrfs_forensics::{fs, path, reader, report};

/// Read-only forensic parser for Btrfs filesystem images.
///
/// Operates directly on a raw image or block device; nothing is ever
/// written back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the partitions found in an image and, for each, whether a
    /// Btrfs superblock was found at its start.
    Partitions {
        image: PathBuf,
    },
    /// Walks one partition's filesystem and prints one record per inode.
    Parse {
        image: PathBuf,
        /// Partition selector: bare decimal bytes, `0x`-prefixed hex, or
        /// an `s`-suffixed sector count (x512). Omit for auto-detect.
        #[arg(long)]
        partition: Option<String>,
        /// Also compute a SHA-256 of each regular file's content. Slower:
        /// every file is fully read and reassembled.
        #[arg(long)]
        hash: bool,
    },
    Cat {
        image: PathBuf,
        #[arg(long)]
        partition: Option<String>,
        /// Subvolume id the path is resolved within; defaults to the
        /// default subvolume (objectid 5).
        #[arg(long, default_value_t = key::FS_TREE_OBJECTID)]
        subvol: u64,
        path: String,
    },
}

/// Parses a `--partition` selector in one of the three forms spec.md §6
/// names: bare decimal bytes, `0x`-prefixed hex, or an `s`-suffixed
/// sector count (x512 bytes/sector).
fn parse_partition_spec(spec: &str) -> anyhow::Result<u64> {
    if let Some(hex) = spec.strip_prefix("0x").or_else(|| spec.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).with_context(|| format!("invalid hex partition spec {spec:?}"));
    }
    if let Some(sectors) = spec.strip_suffix('s').or_else(|| spec.strip_suffix('S')) {
        let sectors: u64 = sectors.parse().with_context(|| format!("invalid sector partition spec {spec:?}"))?;
        return Ok(sectors * 512);
    }
    spec.parse().with_context(|| format!("invalid decimal partition spec {spec:?}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Partitions { image } => cmd_partitions(&image),
        Command::Parse { image, partition, hash } => cmd_parse(&image, partition, hash),
        Command::Cat { image, partition, subvol, path } => cmd_cat(&image, partition, subvol, &path),
    }
}

fn open_image(path: &PathBuf) -> anyhow::Result<Image> {
    Image::open(path).with_context(|| format!("opening {}", path.display()))
}

/// Resolves the byte offset to parse: an explicit `--partition` spec
/// wins outright; otherwise this is spec.md §6's auto-detect mode —
/// print the partition list to stderr, read a numeric selection from
/// stdin (skipped when exactly one candidate with a superblock exists),
/// then confirm with `Proceed with parsing? [Y/n]`. A closed stdin
/// (EOF) defaults to proceeding only when exactly one candidate was
/// found; with more than one candidate and no selection it's an error.
fn resolve_offset(image: &Image, partition: Option<String>) -> anyhow::Result<u64> {
    if let Some(spec) = partition {
        return parse_partition_spec(&spec);
    }

    let candidates: Vec<_> = partition::scan(image)?.into_iter().filter(|(_, sb)| sb.is_some()).collect();
    if candidates.is_empty() {
        anyhow::bail!("no partition with a recognizable Btrfs superblock was found; pass --partition explicitly");
    }

    for (idx, (p, sb)) in candidates.iter().enumerate() {
        let sb = sb.as_ref().expect("filtered to Some above");
        eprintln!("{idx}: offset={:#x} size={:#x} label={:?}", p.offset, p.size, sb.label_str());
    }

    let stdin = std::io::stdin();
    let mut line = String::new();

    let chosen = if candidates.len() == 1 {
        &candidates[0].0
    } else {
        eprint!("Select partition [0-{}]: ", candidates.len() - 1);
        std::io::stderr().flush().ok();
        line.clear();
        let n = stdin.lock().read_line(&mut line)?;
        if n == 0 {
            anyhow::bail!("no partition selection given and more than one candidate was found");
        }
        let idx: usize = line.trim().parse().context("invalid partition selection")?;
        &candidates.get(idx).context("partition selection out of range")?.0
    };

    eprint!("Proceed with parsing? [Y/n] ");
    std::io::stderr().flush().ok();
    line.clear();
    let n = stdin.lock().read_line(&mut line)?;
    if n > 0 {
        let answer = line.trim().to_lowercase();
        if answer == "n" || answer == "no" {
            anyhow::bail!("aborted at user request");
        }
    }

    Ok(chosen.offset)
}

fn cmd_partitions(image_path: &PathBuf) -> anyhow::Result<()> {
    let image = open_image(image_path)?;
    let results = partition::scan(&image)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (partition, sb) in &results {
        let scheme = match partition.scheme {
            PartitionScheme::Mbr => "mbr",
            PartitionScheme::Gpt => "gpt",
            PartitionScheme::BareFs => "bare",
        };
        let label = partition.label.as_deref().unwrap_or("-");
        let btrfs = match sb {
            Some(sb) => format!("btrfs label={:?}", sb.label_str()),
            None => "no superblock".to_string(),
        };
        writeln!(out, "{:>3}  {scheme:<4}  offset={:#x}  size={:#x}  label={label}  {btrfs}", partition.index)?;
    }
    Ok(())
}

fn cmd_parse(image_path: &PathBuf, partition: Option<String>, hash: bool) -> anyhow::Result<()> {
    let image = open_image(image_path)?;
    let offset = resolve_offset(&image, partition)?;
    let (_sb, chunk_map, filesystem) = fs::build(&image, offset).context("reconstructing filesystem")?;
    let registry = DecompressorRegistry::new();

    let (users, groups) = passwd::load_uid_gid_tables(&filesystem, &image, &chunk_map, &registry);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let mut uniques: Vec<_> = filesystem.inodes.keys().copied().collect();
    uniques.sort_unstable();

    for uniq in uniques {
        let inode = filesystem.inode(uniq).expect("key came from the inodes map");
        let mut record = report::build_record(&filesystem, &chunk_map, uniq, inode, &users, &groups);

        if hash && inode.mode & 0o170000 == 0o100000 {
            match reader::read_file(&filesystem, &image, &chunk_map, &registry, uniq) {
                Ok(content) => {
                    record.content_hash = Some(report::hash_file(&content));
                    record.content_hash_md5 = Some(report::hash_file_md5(&content));
                }
                Err(e) => log::warn!("failed to read content for {:?}: {e}", record.path),
            }
        }

        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            record.path.as_deref().unwrap_or("<unreachable>"),
            record.mode_str,
            record.size,
            record.uid_name.as_deref().unwrap_or(&record.uid.to_string()),
            record.gid_name.as_deref().unwrap_or(&record.gid.to_string()),
            record.mtime,
            record.content_hash.as_deref().unwrap_or("-"),
            record.content_hash_md5.as_deref().unwrap_or("-"),
        )?;
    }

    log::info!("finished; {} item(s) skipped during enumeration", filesystem.stats.skipped_items);
    Ok(())
}

fn cmd_cat(image_path: &PathBuf, partition: Option<String>, subvol: u64, target_path: &str) -> anyhow::Result<()> {
    let image = open_image(image_path)?;
    let offset = resolve_offset(&image, partition)?;
    let (_sb, chunk_map, filesystem) = fs::build(&image, offset).context("reconstructing filesystem")?;

    let uniq = filesystem
        .inodes
        .keys()
        .find(|&&uniq| {
            let (sv, _) = split_unique_inode(uniq);
            sv == subvol && path::build_path(&filesystem, uniq).as_deref() == Some(target_path)
        })
        .copied()
        .with_context(|| format!("path {target_path:?} not found in subvolume {subvol}"))?;

    let registry = DecompressorRegistry::new();
    let content = reader::read_file(&filesystem, &image, &chunk_map, &registry, uniq)?;
    std::io::stdout().write_all(&content)?;
    Ok(())
}
