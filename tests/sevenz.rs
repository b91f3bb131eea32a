mod common;

use std::io::Write;

use arcview::{
    open_7z_archive, open_7z_archive_from_reader, Archive, Format, MemoryReader,
    DATA_TERMINATOR_LEN, INVALID_FILE_ID,
};
use chrono::{TimeZone, Utc};
use common::{pattern, sevenz_archive};
use rstest::rstest;

fn open(bytes: Vec<u8>) -> Archive {
    open_7z_archive_from_reader(MemoryReader::new(bytes))
}

fn sample() -> Vec<u8> {
    let readme = pattern(120);
    let logo = pattern(4096);
    sevenz_archive(&[
        ("readme.txt", Some(readme.as_slice())),
        ("img", None),
        ("img/logo.png", Some(logo.as_slice())),
        ("empty.txt", Some(b"".as_slice())),
    ])
}

#[test]
fn lists_entries_in_header_order() {
    let archive = open(sample());
    assert!(archive.is_open());
    assert_eq!(archive.format(), Format::SevenZip);

    let infos = archive.file_infos();
    let names: Vec<_> = infos.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["readme.txt", "img", "img/logo.png", "empty.txt"]);
    for (i, info) in infos.iter().enumerate() {
        assert_eq!(info.id, i);
    }
    assert_eq!(infos[0].size, 120);
    assert_eq!(infos[2].size, 4096);
    assert_eq!(
        infos[0].file_time.to_datetime(),
        Utc.with_ymd_and_hms(2020, 9, 13, 12, 26, 40).single()
    );
}

#[test]
fn extracts_with_terminator_in_any_order() {
    let mut archive = open(sample());
    let logo = archive.file_data_by_id(2).unwrap();
    let readme = archive.file_data_by_name("README.TXT").unwrap();
    let logo_again = archive.file_data_by_name("img/logo.png").unwrap();

    assert_eq!(logo.as_bytes(), pattern(4096).as_slice());
    assert_eq!(logo, logo_again);
    assert_eq!(readme.as_bytes(), pattern(120).as_slice());
    assert_eq!(readme.as_bytes_with_terminator().len(), 120 + DATA_TERMINATOR_LEN);
}

#[test]
fn directories_and_empty_files_have_no_data() {
    let mut archive = open(sample());
    assert!(archive.file_data_by_id(1).unwrap().is_empty());
    let empty = archive.file_data_by_name("empty.txt").unwrap();
    assert_eq!(empty.as_bytes_with_terminator(), [0; DATA_TERMINATOR_LEN]);
}

#[test]
fn duplicate_names_extract_by_id() {
    let mut archive = open(sevenz_archive(&[
        ("a.txt", Some(b"first".as_slice())),
        ("b.txt", Some(b"between".as_slice())),
        ("a.txt", Some(b"second".as_slice())),
    ]));
    assert_eq!(archive.file_infos().len(), 3);
    assert_eq!(archive.file_id("A.TXT"), 0);

    assert_eq!(&*archive.file_data_by_id(2).unwrap(), b"second");
    assert_eq!(&*archive.file_data_by_id(0).unwrap(), b"first");
    assert_eq!(&*archive.file_data_by_name("a.txt").unwrap(), b"first");
    assert_eq!(&*archive.file_data_by_id(1).unwrap(), b"between");
}

#[test]
fn out_of_range_ids_yield_nothing() {
    let mut archive = open(sample());
    assert!(archive.file_data_by_id(4).is_none());
    assert!(archive.file_data_by_id(INVALID_FILE_ID).is_none());
    assert!(archive.comment().is_none());
}

#[rstest]
#[case::empty(Vec::new())]
#[case::garbage(b"not a 7z archive at all, just text".to_vec())]
#[case::truncated_signature(b"7z\xbc\xaf\x27\x1c\x00\x04".to_vec())]
#[case::no_entries(sevenz_archive(&[]))]
fn invalid_streams_fail_to_open(#[case] bytes: Vec<u8>) {
    let mut archive = open(bytes);
    assert_eq!(archive.format(), Format::SevenZip);
    assert!(!archive.is_open());
    assert!(archive.fallback().is_none());
    assert!(archive.file_data_by_id(0).is_none());
}

#[test]
fn opens_from_path() {
    let mut file = tempfile::Builder::new().suffix(".cb7").tempfile().unwrap();
    file.write_all(&sample()).unwrap();
    file.flush().unwrap();

    let mut archive = open_7z_archive(file.path());
    assert!(archive.is_open());
    assert_eq!(archive.source_path(), Some(file.path()));
    assert_eq!(archive.file_data_by_id(2).unwrap().len(), 4096);
}

#[test]
fn missing_and_invalid_paths_fail_to_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!open_7z_archive(dir.path().join("missing.cb7")).is_open());

    let path = dir.path().join("bogus.7z");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"PK\x03\x04 wrong format").unwrap();
    drop(file);

    let archive = open_7z_archive(&path);
    assert!(!archive.is_open());
    assert_eq!(archive.source_path(), Some(path.as_path()));
}
