//! Fixtures shared by the packet tests.

use bzip2::write::BzEncoder;
use bzip2::Compression;

/// Build a `.tar.bz2` archive from (path, content) pairs.
pub(crate) fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = BzEncoder::new(Vec::new(), Compression::best());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A minimal valid packet archive with one artist insert.
pub(crate) fn artist_insert_archive(replication_sequence: i64, change_id: i64) -> Vec<u8> {
    let replication = format!("{replication_sequence}\n");
    let pending = format!("{change_id}\t\"musicbrainz\".\"artist\"\ti\t1\n");
    let data = format!("{change_id}\tf\t\"id\"='{change_id}' \"name\"='Artist {change_id}' \n");
    build_archive(&[
        ("REPLICATION_SEQUENCE", &replication),
        ("SCHEMA_SEQUENCE", "12\n"),
        ("mbdump/dbmirror_pending", &pending),
        ("mbdump/dbmirror_pendingdata", &data),
    ])
}
