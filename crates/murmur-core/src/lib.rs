//! Foundational helpers shared across murmur crates.

pub mod fs_io;

pub use fs_io::write_text_atomic;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::write_text_atomic;

    #[test]
    fn unit_write_text_atomic_creates_missing_parent_directories() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested").join("state.json");
        write_text_atomic(&path, "content").expect("write");
        assert_eq!(read_to_string(&path).expect("read"), "content");
    }

    #[test]
    fn functional_write_text_atomic_replaces_existing_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("state.json");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        assert_eq!(read_to_string(&path).expect("read"), "second");
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_targets() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "content").expect_err("must fail");
        assert!(error.to_string().contains("directory"));
    }

    #[test]
    fn regression_write_text_atomic_leaves_no_temp_files_behind() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("state.json");
        write_text_atomic(&path, "content").expect("write");
        let leftovers: Vec<_> = std::fs::read_dir(tempdir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != "state.json")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }
}
