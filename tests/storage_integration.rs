use msgjournal::storage::index::Index;
use msgjournal::storage::record::Record;
use msgjournal::storage::store::Store;
use tempfile::TempDir;

#[test]
fn store_and_index_coordinate_across_records() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let store_path = temp_dir.path().join("test.log");
    let index_path = temp_dir.path().join("test.idx");

    let payloads = [
        "Hello, World!",
        "This is record 2",
        "Short",
        "This is a much longer record with more text to see variable sizing",
        "Final record",
    ];

    let mut positions = Vec::new();

    {
        let mut store = Store::new(&store_path)?;
        let mut index = Index::new(&index_path, 1024 * 1024)?;

        for (offset, payload) in payloads.iter().enumerate() {
            let record = Record::new(offset as u64, None, payload.as_bytes().to_vec());
            let encoded = record.encode()?;
            let (position, _bytes_written) = store.append(&encoded)?;
            index.write(offset as u64, position)?;
            positions.push(position);
        }

        assert_eq!(index.len(), payloads.len() as u64);
    }

    {
        let store = Store::new(&store_path)?;
        let index = Index::new(&index_path, 1024 * 1024)?;

        for (i, &expected_pos) in positions.iter().enumerate() {
            let position = index.read(i as u64)?;
            assert_eq!(position, expected_pos);

            let window = store.read_window(position)?;
            let (decoded, _consumed) = Record::decode(window)?;
            assert_eq!(decoded.payload, payloads[i].as_bytes());
            assert_eq!(decoded.offset, i as u64);
        }
    }

    Ok(())
}

#[test]
fn random_access_via_index_finds_the_right_record() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let store_path = temp_dir.path().join("test.log");
    let index_path = temp_dir.path().join("test.idx");

    let payloads = ["First", "Second", "Third", "Fourth", "Fifth"];

    {
        let mut store = Store::new(&store_path)?;
        let mut index = Index::new(&index_path, 1024 * 1024)?;

        for (offset, payload) in payloads.iter().enumerate() {
            let record = Record::new(offset as u64, None, payload.as_bytes().to_vec());
            let (position, _) = store.append(&record.encode()?)?;
            index.write(offset as u64, position)?;
        }
    }

    {
        let store = Store::new(&store_path)?;
        let index = Index::new(&index_path, 1024 * 1024)?;

        let access_pattern = [2, 0, 4, 1, 3];
        for &offset in &access_pattern {
            let position = index.read(offset)?;
            let window = store.read_window(position)?;
            let (decoded, _) = Record::decode(window)?;
            assert_eq!(decoded.payload, payloads[offset as usize].as_bytes());
        }
    }

    Ok(())
}

#[test]
fn index_entries_are_a_fixed_sixteen_bytes_each() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let store_path = temp_dir.path().join("test.log");
    let index_path = temp_dir.path().join("test.idx");

    let mut store = Store::new(&store_path)?;
    let mut index = Index::new(&index_path, 1024 * 1024)?;

    let num_records = 100u64;
    let payload = b"Test record data".to_vec();

    let mut expected_store_size = 0u64;
    for i in 0..num_records {
        let record = Record::new(i, None, payload.clone());
        let encoded = record.encode()?;
        expected_store_size += encoded.len() as u64;
        let (position, _) = store.append(&encoded)?;
        index.write(i, position)?;
    }

    let index_size = index.size();
    let bytes_per_entry = index_size / num_records;
    assert_eq!(
        bytes_per_entry, 16,
        "index entry should be 16 bytes (8 bytes offset + 8 bytes position)"
    );

    assert_eq!(store.size(), expected_store_size);

    Ok(())
}

#[test]
fn segment_recovers_sequential_offsets_after_reopen() -> Result<(), Box<dyn std::error::Error>> {
    use msgjournal::clock::SystemClock;
    use msgjournal::config::{DEFAULT_INDEX_INTERVAL_BYTES, DEFAULT_MAX_INDEX_SIZE_BYTES};
    use msgjournal::storage::segment::Segment;
    use std::sync::Arc;

    let temp_dir = TempDir::new()?;
    let store_path = temp_dir.path().join("00000000000000000000.log");
    let index_path = temp_dir.path().join("00000000000000000000.idx");

    {
        let mut segment = Segment::new(
            store_path.clone(),
            index_path.clone(),
            0,
            1024 * 1024,
            DEFAULT_MAX_INDEX_SIZE_BYTES,
            DEFAULT_INDEX_INTERVAL_BYTES,
            Arc::new(SystemClock),
        )?;
        segment.append(&[
            (None, b"a".to_vec()),
            (Some(b"k".to_vec()), b"b".to_vec()),
            (None, b"c".to_vec()),
        ])?;
        segment.flush()?;
    }

    let segment = Segment::new(
        store_path,
        index_path,
        0,
        1024 * 1024,
        DEFAULT_MAX_INDEX_SIZE_BYTES,
        DEFAULT_INDEX_INTERVAL_BYTES,
        Arc::new(SystemClock),
    )?;
    assert_eq!(segment.next_offset(), 3);
    let records = segment.read(0, 4096, None)?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].key, Some(b"k".to_vec()));

    Ok(())
}
