//! Replication packet archives.
//!
//! An archive is a bzip2-compressed tarball holding:
//! - `REPLICATION_SEQUENCE` and `SCHEMA_SEQUENCE`: one number each
//! - `mbdump/dbmirror_pending` (older packets: `mbdump/Pending`): one line
//!   per change, `seqid<TAB>"schema"."table"<TAB>op<TAB>xid`
//! - `mbdump/dbmirror_pendingdata` (older packets: `mbdump/PendingData`):
//!   one line per row image, `seqid<TAB>iskey<TAB>packed data`
//!
//! The dump files use PostgreSQL COPY text escaping. Entry order inside the
//! tarball is not significant.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use bzip2::read::BzDecoder;
use tar::Archive;
use tracing::debug;

use livefeed_types::{unescape_copy_text, unpack, ChangeRecord, Operation, ReplicationPacket};

use crate::error::PacketError;

const REPLICATION_SEQUENCE_ENTRY: &str = "REPLICATION_SEQUENCE";
const SCHEMA_SEQUENCE_ENTRY: &str = "SCHEMA_SEQUENCE";
const PENDING_ENTRIES: [&str; 2] = ["mbdump/dbmirror_pending", "mbdump/Pending"];
const PENDING_DATA_ENTRIES: [&str; 2] = ["mbdump/dbmirror_pendingdata", "mbdump/PendingData"];

/// Decode a packet archive on the blocking thread pool.
pub async fn decode_packet(bytes: Vec<u8>) -> Result<ReplicationPacket, PacketError> {
    tokio::task::spawn_blocking(move || read_archive(Cursor::new(bytes)))
        .await
        .map_err(|e| PacketError::Join(e.to_string()))?
}

/// Read a packet from a `.tar.bz2` stream.
pub fn read_archive<R: Read>(reader: R) -> Result<ReplicationPacket, PacketError> {
    let mut archive = Archive::new(BzDecoder::new(reader));

    let mut replication_sequence = None;
    let mut schema_sequence = None;
    let mut pending = String::new();
    let mut pending_data = String::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();
        let name = path.trim_start_matches("./");

        if name == REPLICATION_SEQUENCE_ENTRY {
            replication_sequence = Some(parse_sequence_file(&read_entry(&mut entry, name)?, name)?);
        } else if name == SCHEMA_SEQUENCE_ENTRY {
            schema_sequence = Some(parse_sequence_file(&read_entry(&mut entry, name)?, name)?);
        } else if PENDING_ENTRIES.contains(&name) {
            pending.push_str(&read_entry(&mut entry, name)?);
        } else if PENDING_DATA_ENTRIES.contains(&name) {
            pending_data.push_str(&read_entry(&mut entry, name)?);
        }
    }

    let replication_sequence = replication_sequence
        .ok_or_else(|| PacketError::Archive(format!("missing {REPLICATION_SEQUENCE_ENTRY}")))?;
    let schema_sequence = schema_sequence
        .ok_or_else(|| PacketError::Archive(format!("missing {SCHEMA_SEQUENCE_ENTRY}")))?;

    let mut changes = BTreeMap::new();
    for line in pending.lines().filter(|l| !l.is_empty()) {
        let change = parse_pending_line(line)?;
        changes.insert(change.id, change);
    }
    for line in pending_data.lines().filter(|l| !l.is_empty()) {
        apply_pending_data_line(&mut changes, line)?;
    }

    let packet = ReplicationPacket::new(schema_sequence, replication_sequence)
        .with_changes(changes.into_values().collect());

    debug!(
        replication_sequence,
        schema_sequence,
        changes = packet.changes.len(),
        "Decoded packet archive"
    );
    Ok(packet)
}

fn read_entry<R: Read>(entry: &mut R, name: &str) -> Result<String, PacketError> {
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| PacketError::Archive(format!("reading {name}: {e}")))?;
    Ok(content)
}

fn parse_sequence_file(content: &str, name: &str) -> Result<i64, PacketError> {
    let text = content.lines().next().unwrap_or("").trim();
    text.parse::<i64>()
        .map_err(|_| PacketError::Archive(format!("{name} is not a number: {text:?}")))
}

/// Drop the schema qualifier and quotes from a dumped table name.
pub fn normalize_table_name(raw: &str) -> String {
    let unqualified = raw.rsplit('.').next().unwrap_or(raw);
    unqualified.trim_matches('"').to_string()
}

fn parse_seqid(field: Option<&str>, line: &str) -> Result<i64, PacketError> {
    field
        .and_then(|f| f.trim().parse::<i64>().ok())
        .ok_or_else(|| PacketError::Archive(format!("bad change id in line {line:?}")))
}

fn parse_pending_line(line: &str) -> Result<ChangeRecord, PacketError> {
    let mut fields = line.split('\t');
    let id = parse_seqid(fields.next(), line)?;
    let table = fields
        .next()
        .ok_or_else(|| PacketError::Archive(format!("missing table name in line {line:?}")))?;
    let op_code = fields
        .next()
        .ok_or_else(|| PacketError::Archive(format!("missing operation in line {line:?}")))?;
    let operation = Operation::from_code(op_code.trim())
        .ok_or_else(|| PacketError::Archive(format!("unknown operation {op_code:?} for change {id}")))?;

    Ok(ChangeRecord::new(
        id,
        normalize_table_name(&unescape_copy_text(table)),
        operation,
    ))
}

fn apply_pending_data_line(
    changes: &mut BTreeMap<i64, ChangeRecord>,
    line: &str,
) -> Result<(), PacketError> {
    let mut fields = line.splitn(3, '\t');
    let id = parse_seqid(fields.next(), line)?;
    let is_key = match fields.next() {
        Some("t") => true,
        Some("f") => false,
        other => {
            return Err(PacketError::Archive(format!(
                "bad key flag {other:?} for change {id}"
            )))
        }
    };
    let data = match fields.next() {
        None | Some("\\N") => String::new(),
        Some(data) => unescape_copy_text(data),
    };

    let change = changes
        .get_mut(&id)
        .ok_or_else(|| PacketError::Archive(format!("row data for unknown change {id}")))?;
    change.apply_row_image(is_key, unpack(&data)?);
    Ok(())
}
