//! Integration tests for the mount side, driven through the resolver and
//! the open-file table against real archives. Covers path classification,
//! clipped reads, the raw-offset and full-decode read paths, and
//! attribute-as-file surfacing.

use std::fs;
use std::path::{Path, PathBuf};

use h5vfs_archive::read_attr_bytes;
use h5vfs_fuse::{EntryKind, Node, OpenFileTable, Resolver};
use h5vfs_packer::{open_or_create_archive, PackOptions, Packer};

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

/// Build a packer-produced archive from a small source tree.
fn packed_archive(tmp: &Path, build: impl FnOnce(&Path)) -> PathBuf {
    let base: PathBuf = tmp.join("base");
    fs::create_dir_all(&base).unwrap();
    build(&base);

    let output: PathBuf = tmp.join("out.h5");
    let opts: PackOptions = PackOptions::default();
    let archive: hdf5::File =
        open_or_create_archive(&output, &[base.clone()], opts.new_roots).unwrap();
    let mut packer: Packer = Packer::new(&archive, &opts);
    packer.pack_root(&base).unwrap();
    drop(packer);
    drop(archive);
    output
}

#[test]
fn test_resolve_groups_and_datasets() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("a.txt"), b"abc");
        write_file(&base.join("sub").join("b.txt"), b"bb");
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let resolver: Resolver = Resolver::new(&file, Resolver::surfacing_enabled(&file));

    match resolver.resolve("/").unwrap() {
        Some(Node::Dir { .. }) => {}
        other => panic!("root resolved to {:?}", other),
    }
    match resolver.resolve("/base").unwrap() {
        Some(Node::Dir { meta }) => {
            assert!(meta.modified.is_some());
            assert!(meta.permissions.is_some());
        }
        other => panic!("/base resolved to {:?}", other),
    }
    match resolver.resolve("/base/a.txt").unwrap() {
        Some(Node::File { size, meta }) => {
            assert_eq!(size, 3);
            assert!(meta.created.is_some());
        }
        other => panic!("/base/a.txt resolved to {:?}", other),
    }
    assert_eq!(resolver.resolve("/base/missing").unwrap(), None);
    assert_eq!(resolver.resolve("/nothing/at/all").unwrap(), None);

    // Generic dot entries never consult the archive
    match resolver.resolve("/base/.").unwrap() {
        Some(Node::Dir { meta }) => assert_eq!(meta.created, None),
        other => panic!(". resolved to {:?}", other),
    }
    match resolver.resolve("/base/..").unwrap() {
        Some(Node::Dir { .. }) => {}
        other => panic!(".. resolved to {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_resolve_soft_link_with_target_size() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("target"), b"payload");
        std::os::unix::fs::symlink("target", base.join("link")).unwrap();
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let resolver: Resolver = Resolver::new(&file, false);

    match resolver.resolve("/base/link").unwrap() {
        Some(Node::SoftLink { target, size }) => {
            assert_eq!(target, "/base/target");
            assert_eq!(size, 7);
        }
        other => panic!("/base/link resolved to {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_resolve_external_link() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let outside: PathBuf = tmp.path().join("outside.dat");
    write_file(&outside, b"outside bytes");

    let base: PathBuf = tmp.path().join("base");
    fs::create_dir_all(&base).unwrap();
    write_file(&base.join("anchor"), b"a");
    std::os::unix::fs::symlink(&outside, base.join("out")).unwrap();

    let output: PathBuf = tmp.path().join("out.h5");
    let opts: PackOptions = PackOptions {
        external_symlinks: h5vfs_packer::ExternalSymlinkPolicy::Link,
        ..Default::default()
    };
    let archive: hdf5::File = open_or_create_archive(&output, &[base.clone()], false).unwrap();
    let mut packer: Packer = Packer::new(&archive, &opts);
    packer.pack_root(&base).unwrap();
    drop(packer);
    drop(archive);

    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let resolver: Resolver = Resolver::new(&file, false);

    match resolver.resolve("/base/out").unwrap() {
        Some(Node::ExternalLink { target, size }) => {
            // readlink returns the stored host path verbatim
            assert_eq!(target, outside.display().to_string());
            // and stat sizes the link through the host target
            assert_eq!(size, b"outside bytes".len() as u64);
        }
        other => panic!("/base/out resolved to {:?}", other),
    }
}

#[test]
fn test_clipped_reads() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("a.txt"), b"abc");
        write_file(&base.join("empty"), b"");
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let mut table: OpenFileTable = OpenFileTable::new();

    table.open(&file, "/base/a.txt").unwrap();
    assert_eq!(
        table.read(&output, "/base/a.txt", 0, 3).unwrap(),
        b"abc".to_vec()
    );
    // offset + size past the end clips to file_size - offset
    assert_eq!(
        table.read(&output, "/base/a.txt", 1, 10).unwrap(),
        b"bc".to_vec()
    );
    // offset at or past the end reads nothing
    assert!(table.read(&output, "/base/a.txt", 3, 1).unwrap().is_empty());
    assert!(table.read(&output, "/base/a.txt", 10, 5).unwrap().is_empty());
    table.release("/base/a.txt").unwrap();

    // Empty datasets read as zero bytes at any offset
    table.open(&file, "/base/empty").unwrap();
    assert!(table.read(&output, "/base/empty", 0, 16).unwrap().is_empty());
    assert!(table.read(&output, "/base/empty", 5, 16).unwrap().is_empty());
    table.release("/base/empty").unwrap();
}

#[test]
fn test_open_refcounting() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("a.txt"), b"abc");
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let mut table: OpenFileTable = OpenFileTable::new();

    table.open(&file, "/base/a.txt").unwrap();
    table.open(&file, "/base/a.txt").unwrap();
    assert_eq!(table.open_count(), 1);

    table.release("/base/a.txt").unwrap();
    // Still referenced by the second open
    assert!(table.contains("/base/a.txt"));

    table.release("/base/a.txt").unwrap();
    assert!(!table.contains("/base/a.txt"));
    assert_eq!(table.open_count(), 0);

    // Releasing an unopened path reports not-found
    assert!(table.release("/base/a.txt").is_err());
}

#[cfg(unix)]
#[test]
fn test_hard_linked_paths_read_identical_bytes() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("x"), b"payload");
        fs::hard_link(base.join("x"), base.join("y")).unwrap();
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let resolver: Resolver = Resolver::new(&file, false);
    let mut table: OpenFileTable = OpenFileTable::new();

    let size_x: u64 = match resolver.resolve("/base/x").unwrap() {
        Some(Node::File { size, .. }) => size,
        other => panic!("/base/x resolved to {:?}", other),
    };
    let size_y: u64 = match resolver.resolve("/base/y").unwrap() {
        Some(Node::File { size, .. }) => size,
        other => panic!("/base/y resolved to {:?}", other),
    };
    assert_eq!(size_x, size_y);

    table.open(&file, "/base/x").unwrap();
    table.open(&file, "/base/y").unwrap();
    let x: Vec<u8> = table.read(&output, "/base/x", 0, 64).unwrap();
    let y: Vec<u8> = table.read(&output, "/base/y", 0, 64).unwrap();
    assert_eq!(x, b"payload".to_vec());
    assert_eq!(x, y);
}

#[test]
fn test_full_decode_fallback_for_chunked_storage() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = tmp.path().join("chunked.h5");
    let data: Vec<u8> = (0u8..64).collect();
    {
        let file: hdf5::File = hdf5::File::create(&output).unwrap();
        let ds: hdf5::Dataset = file
            .new_dataset::<u8>()
            .shape(data.len())
            .chunk(16)
            .create("blob")
            .unwrap();
        ds.write_raw(&data).unwrap();
    }

    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    // Chunked layout has no contiguous offset; reads must decode
    assert!(h5vfs_archive::dataset_raw_offset(&file.dataset("/blob").unwrap()).is_none());

    let mut table: OpenFileTable = OpenFileTable::new();
    table.open(&file, "/blob").unwrap();
    assert_eq!(table.read(&output, "/blob", 0, 64).unwrap(), data);
    // Second read is served from the materialized cache
    assert_eq!(
        table.read(&output, "/blob", 10, 6).unwrap(),
        data[10..16].to_vec()
    );
    table.release("/blob").unwrap();
}

#[test]
fn test_surfacing_disabled_on_packed_archives() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("a.txt"), b"abc");
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();

    // The packer stamps H5VFS, so its metadata attributes stay hidden
    assert!(!Resolver::surfacing_enabled(&file));
    let resolver: Resolver = Resolver::new(&file, false);

    let entries: Vec<(String, EntryKind)> = resolver.list_dir("/base").unwrap();
    assert!(entries.iter().any(|(name, _)| name == "a.txt"));
    assert!(!entries.iter().any(|(name, _)| name.contains(".attr.")));

    // Attribute-as-file names do not resolve either
    assert_eq!(
        resolver.resolve("/base/.a.txt.attr.MD5Hash").unwrap(),
        None
    );
}

#[test]
fn test_surfacing_enabled_on_foreign_archives() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = tmp.path().join("foreign.h5");
    {
        let file: hdf5::File = hdf5::File::create(&output).unwrap();
        let group: hdf5::Group = file.create_group("g").unwrap();
        group
            .new_attr::<i64>()
            .create("Units")
            .unwrap()
            .write_scalar(&42i64)
            .unwrap();
        let ds: hdf5::Dataset = file.new_dataset::<u8>().shape(4).create("d").unwrap();
        ds.write_raw(&[1u8, 2, 3, 4]).unwrap();
        ds.new_attr::<i64>()
            .create("Note")
            .unwrap()
            .write_scalar(&7i64)
            .unwrap();
    }

    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    assert!(Resolver::surfacing_enabled(&file));
    let resolver: Resolver = Resolver::new(&file, true);

    // readdir shows one synthetic hidden file per attribute per child
    let entries: Vec<(String, EntryKind)> = resolver.list_dir("/").unwrap();
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"g"));
    assert!(names.contains(&".g.attr.Units"));
    assert!(names.contains(&"d"));
    assert!(names.contains(&".d.attr.Note"));

    // The synthetic file stats with the attribute's byte size
    match resolver.resolve("/.g.attr.Units").unwrap() {
        Some(Node::AttrFile { size }) => assert_eq!(size, 8),
        other => panic!("attr file resolved to {:?}", other),
    }

    // Reading yields the raw stored bytes of the value
    let attr: hdf5::Attribute = resolver.attr_for_path("/.d.attr.Note").unwrap();
    let bytes: Vec<u8> = read_attr_bytes(&attr).unwrap();
    assert_eq!(bytes.len(), 8);
    assert_eq!(bytes[0], 7);

    // Malformed synthetic names fall through to absent
    assert_eq!(resolver.resolve("/.g.attr.").unwrap(), None);
    assert_eq!(resolver.resolve("/.attr.Units").unwrap(), None);
    assert_eq!(resolver.resolve("/.missing.attr.Units").unwrap(), None);
}

#[test]
fn test_list_dir_kinds() {
    let tmp: tempfile::TempDir = tempfile::tempdir().unwrap();
    let output: PathBuf = packed_archive(tmp.path(), |base: &Path| {
        write_file(&base.join("file.txt"), b"f");
        write_file(&base.join("dir").join("inner"), b"i");
        #[cfg(unix)]
        std::os::unix::fs::symlink("file.txt", base.join("link")).unwrap();
    });
    let file: hdf5::File = hdf5::File::open(&output).unwrap();
    let resolver: Resolver = Resolver::new(&file, false);

    let entries: Vec<(String, EntryKind)> = resolver.list_dir("/base").unwrap();
    let kind_of = |wanted: &str| -> EntryKind {
        entries
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, kind)| *kind)
            .unwrap()
    };
    assert_eq!(kind_of("file.txt"), EntryKind::File);
    assert_eq!(kind_of("dir"), EntryKind::Directory);
    #[cfg(unix)]
    assert_eq!(kind_of("link"), EntryKind::Symlink);

    // Listing a dataset is a not-a-directory error
    assert!(resolver.list_dir("/base/file.txt").is_err());
    // Listing a missing path is not-found
    assert!(resolver.list_dir("/nowhere").is_err());
}
