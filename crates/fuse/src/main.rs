//! `h5vfs` - mount an HDF5 archive as a read-only filesystem.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use fuser::MountOption;

use h5vfs_fuse::H5Vfs;

#[derive(Parser, Debug)]
#[command(
    name = "h5vfs",
    version,
    about = "Mount an HDF5 archive as a read-only filesystem"
)]
struct Args {
    /// Archive file to mount
    #[arg(value_name = "FILE")]
    container: PathBuf,

    /// Directory to mount at
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,

    /// Additional FUSE options, passed through (e.g. -o allow_other)
    #[arg(
        value_name = "OPTIONS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    fuse_args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Args = Args::try_parse().unwrap_or_else(|err: clap::Error| {
        let _ = err.print();
        let code: i32 = match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
            _ => 1,
        };
        process::exit(code);
    });

    process::exit(run(args));
}

fn run(args: Args) -> i32 {
    let container: PathBuf = match args.container.canonicalize() {
        Ok(path) => path,
        Err(_) => {
            eprintln!("file {} does not exist", args.container.display());
            return 1;
        }
    };
    let mountpoint: PathBuf = match args.mountpoint.canonicalize() {
        Ok(path) => path,
        Err(_) => {
            eprintln!("mount point {} does not exist", args.mountpoint.display());
            return 1;
        }
    };

    let archive: hdf5::File = match hdf5::File::open(&container) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("cannot open {}: {}", container.display(), err);
            return 1;
        }
    };

    let vfs: H5Vfs = H5Vfs::new(archive, container.clone(), mountpoint.clone());
    if vfs.surfaces_attributes() {
        tracing::info!("foreign archive: surfacing attributes as hidden files");
    }

    // The mount is strictly read-only and announces itself as h5vfs; any
    // extra -o options from the command line ride along.
    let mut options: Vec<MountOption> = vec![MountOption::RO, MountOption::FSName("h5vfs".into())];
    options.extend(passthrough_options(&args.fuse_args));

    tracing::info!(
        "mounting {} at {}",
        container.display(),
        mountpoint.display()
    );
    match fuser::mount2(vfs, &mountpoint, &options) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("mount failed: {}", err);
            1
        }
    }
}

/// Translate `-o name[,name...]` argument pairs into mount options.
fn passthrough_options(args: &[String]) -> Vec<MountOption> {
    let mut options: Vec<MountOption> = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let value: Option<String> = if arg == "-o" {
            iter.next().cloned()
        } else if let Some(rest) = arg.strip_prefix("-o") {
            Some(rest.to_string())
        } else {
            tracing::warn!("ignoring unrecognized argument {}", arg);
            None
        };
        if let Some(value) = value {
            for part in value.split(',').filter(|p: &&str| !p.is_empty()) {
                options.push(mount_option(part));
            }
        }
    }
    options
}

fn mount_option(name: &str) -> MountOption {
    match name {
        "ro" => MountOption::RO,
        "auto_unmount" => MountOption::AutoUnmount,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "default_permissions" => MountOption::DefaultPermissions,
        other => MountOption::CUSTOM(other.to_string()),
    }
}
