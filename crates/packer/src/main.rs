//! `tohdf5` - coalesce directory trees into a single HDF5 archive.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use h5vfs_common::{last_path_chunk, normalize_root, DEFAULT_CHUNK_SIZE};
use h5vfs_packer::{
    compile_patterns, glob_to_regex, open_or_create_archive, ExternalSymlinkPolicy, PackError,
    PackOptions, Packer, UpdatePolicy,
};

#[derive(Parser, Debug)]
#[command(
    name = "tohdf5",
    version,
    about = "Coalesce directory trees into a single HDF5 archive"
)]
struct Args {
    /// Directories to coalesce; each becomes a top-level group. Multiple
    /// directories require --output.
    #[arg(required = true, value_name = "DIRECTORY")]
    directories: Vec<PathBuf>,

    /// Output archive path. Defaults to <basename of first directory>.h5
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Glob of file names to include (repeatable)
    #[arg(long = "acceptfile", value_name = "GLOB")]
    accept_file: Vec<String>,

    /// Regex of file names to include (repeatable)
    #[arg(long = "acceptfileregex", value_name = "REGEX")]
    accept_file_regex: Vec<String>,

    /// Glob of file names to exclude (repeatable)
    #[arg(long = "rejectfile", value_name = "GLOB")]
    reject_file: Vec<String>,

    /// Regex of file names to exclude (repeatable)
    #[arg(long = "rejectfileregex", value_name = "REGEX")]
    reject_file_regex: Vec<String>,

    /// Glob of directory names to include (repeatable)
    #[arg(long = "acceptdir", value_name = "GLOB")]
    accept_dir: Vec<String>,

    /// Regex of directory names to include (repeatable)
    #[arg(long = "acceptdirregex", value_name = "REGEX")]
    accept_dir_regex: Vec<String>,

    /// Glob of directory names to exclude (repeatable)
    #[arg(long = "rejectdir", value_name = "GLOB")]
    reject_dir: Vec<String>,

    /// Regex of directory names to exclude (repeatable)
    #[arg(long = "rejectdirregex", value_name = "REGEX")]
    reject_dir_regex: Vec<String>,

    /// Write/read chunk size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk: u64,

    /// Policy when a destination name already exists in the archive
    #[arg(long = "updatepolicy", value_enum, default_value_t = UpdatePolicy::Never)]
    update_policy: UpdatePolicy,

    /// Permit new top-level groups when appending to an existing archive
    #[arg(
        long = "newroots",
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_name = "BOOL"
    )]
    new_roots: bool,

    /// Handling of symlinks whose target lies outside the base directory
    #[arg(
        long = "storeexternalsymlinks",
        value_enum,
        default_value_t = ExternalSymlinkPolicy::Ignore
    )]
    store_external_symlinks: ExternalSymlinkPolicy,

    /// Keep directories that end up containing no stored items
    #[arg(
        long = "allowemptydirs",
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_name = "BOOL"
    )]
    allow_empty_dirs: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args: Args = Args::try_parse().unwrap_or_else(|err: clap::Error| {
        let _ = err.print();
        let code: i32 = match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
            _ => -1,
        };
        process::exit(code);
    });

    process::exit(run(args));
}

fn run(args: Args) -> i32 {
    if args.directories.len() > 1 && args.output.is_none() {
        eprintln!("coalescing multiple directories requires --output");
        return -1;
    }
    if args.chunk == 0 {
        eprintln!("--chunk must be a positive number of bytes");
        return -1;
    }

    let opts: PackOptions = match build_options(&args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{}", err);
            return -1;
        }
    };

    // Normalize the roots up front; link-path composition is relative to
    // these.
    let mut roots: Vec<PathBuf> = Vec::with_capacity(args.directories.len());
    for dir in &args.directories {
        match normalize_root(dir) {
            Ok(root) => roots.push(root),
            Err(err) => {
                eprintln!("{}", err);
                return -1;
            }
        }
    }

    let output: PathBuf = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.h5", last_path_chunk(&roots[0]))));

    let archive: hdf5::File = match open_or_create_archive(&output, &roots, opts.new_roots) {
        Ok(file) => file,
        Err(err @ PackError::Config(_)) => {
            eprintln!("{}", err);
            return -1;
        }
        Err(err) => {
            eprintln!("{}", err);
            return 1;
        }
    };

    let mut packer: Packer = Packer::new(&archive, &opts);
    let mut total: usize = 0;
    for root in &roots {
        log::info!("coalescing {}", root.display());
        match packer.pack_root(root) {
            Ok(count) => total += count,
            Err(err) => {
                eprintln!("{}", err);
                return 1;
            }
        }
    }
    drop(packer);
    drop(archive);

    if total > 0 {
        log::info!("coalescence completed successfully");
    } else {
        log::info!("coalescence completed successfully, but no files added");
    }
    0
}

fn build_options(args: &Args) -> Result<PackOptions, PackError> {
    // CLI globs are translated into regexes and merged with the explicit
    // regex lists.
    let merge = |globs: &[String], regexes: &[String]| -> Vec<String> {
        globs
            .iter()
            .map(|g: &String| glob_to_regex(g))
            .chain(regexes.iter().cloned())
            .collect()
    };

    Ok(PackOptions {
        accept_file: compile_patterns(&merge(&args.accept_file, &args.accept_file_regex))?,
        reject_file: compile_patterns(&merge(&args.reject_file, &args.reject_file_regex))?,
        accept_dir: compile_patterns(&merge(&args.accept_dir, &args.accept_dir_regex))?,
        reject_dir: compile_patterns(&merge(&args.reject_dir, &args.reject_dir_regex))?,
        update_policy: args.update_policy,
        external_symlinks: args.store_external_symlinks,
        chunk_size: args.chunk,
        allow_empty_dirs: args.allow_empty_dirs,
        new_roots: args.new_roots,
    })
}
