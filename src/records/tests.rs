use super::*;

fn key(name: &str, qtype: RecordType) -> QueryKey {
    QueryKey::from_name(name, qtype).unwrap()
}

fn table() -> RecordTable {
    let table = RecordTable::new();
    table.insert_a(
        key("www.example.test", RecordType::A),
        ARecord {
            address: Ipv4Addr::new(93, 184, 216, 34),
            ttl: 300,
        },
    );
    table.insert_aaaa(
        key("www.example.test", RecordType::Aaaa),
        AaaaRecord {
            address: "2001:db8::34".parse().unwrap(),
            ttl: 60,
        },
    );
    table
}

#[test]
fn matcher_selects_table_by_type() {
    let table = table();
    let a = match_record(&table, &key("www.example.test", RecordType::A), 7, false).unwrap();
    assert_eq!(
        a,
        Answer::A {
            address: Ipv4Addr::new(93, 184, 216, 34),
            ttl: 300
        }
    );
    let aaaa =
        match_record(&table, &key("www.example.test", RecordType::Aaaa), 7, false).unwrap();
    assert_eq!(aaaa.ttl(), 60);
    assert!(matches!(aaaa, Answer::Aaaa { .. }));
}

#[test]
fn miss_and_unsupported_type_are_distinct() {
    let table = table();
    assert_eq!(
        match_record(&table, &key("nope.example.test", RecordType::A), 1, false),
        Err(ProcessError::RecordNotFound)
    );
    assert_eq!(
        match_record(&table, &key("www.example.test", RecordType::Other(16)), 1, false),
        Err(ProcessError::UnsupportedType(16))
    );
}

#[test]
fn a_key_does_not_hit_aaaa_table() {
    let table = RecordTable::new();
    table.insert_aaaa(
        key("v6only.test", RecordType::Aaaa),
        AaaaRecord {
            address: Ipv6Addr::LOCALHOST,
            ttl: 5,
        },
    );
    assert_eq!(
        match_record(&table, &key("v6only.test", RecordType::A), 1, false),
        Err(ProcessError::RecordNotFound)
    );
}

#[test]
fn random_ttl_stays_in_upper_half() {
    for ttl in [2u32, 3, 10, 300, 86_400, u32::MAX] {
        for id in [0u16, 1, 149, 150, 4242, u16::MAX] {
            let jittered = effective_ttl(ttl, id, true);
            assert!(jittered >= ttl / 2, "ttl {ttl} id {id} -> {jittered}");
            assert!(jittered <= ttl);
            assert_eq!(jittered, u32::from(id) % (ttl / 2) + ttl / 2);
        }
    }
    assert_eq!(effective_ttl(300, 7, true), 157);
}

#[test]
fn fixed_ttl_is_identity() {
    for ttl in [0u32, 1, 300, u32::MAX] {
        assert_eq!(effective_ttl(ttl, 1234, false), ttl);
        assert_eq!(effective_ttl(effective_ttl(ttl, 1, false), 2, false), ttl);
    }
    assert_eq!(effective_ttl(0, 9, true), 0);
    assert_eq!(effective_ttl(1, 9, true), 1);
}

#[test]
fn administration_updates_lookups() {
    let table = table();
    assert_eq!(table.len(), 2);
    let replaced = table.insert_a(
        key("www.example.test", RecordType::A),
        ARecord {
            address: Ipv4Addr::new(192, 0, 2, 1),
            ttl: 30,
        },
    );
    assert_eq!(replaced.map(|r| r.ttl), Some(300));
    assert_eq!(table.len(), 2);

    assert!(table.remove(&key("www.example.test", RecordType::A)));
    assert!(!table.remove(&key("www.example.test", RecordType::A)));
    assert!(table.get_a(&key("www.example.test", RecordType::A)).is_none());

    table.clear();
    assert!(table.is_empty());
}

#[test]
fn lookups_do_not_wait_for_writers() {
    let table = Arc::new(table());
    let guard = table.writer.lock();

    let (tx, rx) = crossbeam_channel::bounded(1);
    let reader = Arc::clone(&table);
    let handle = std::thread::spawn(move || {
        let hit = reader.get_a(&key("www.example.test", RecordType::A));
        let _ = tx.send(hit.map(|record| record.ttl));
    });
    let seen = rx.recv_timeout(std::time::Duration::from_secs(2));
    drop(guard);
    handle.join().unwrap();
    assert_eq!(seen, Ok(Some(300)));
}

#[test]
fn published_snapshot_is_stable_across_writes() {
    let table = table();
    let before = table.a.load_full();
    table.insert_a(
        key("api.example.test", RecordType::A),
        ARecord {
            address: Ipv4Addr::new(192, 0, 2, 7),
            ttl: 5,
        },
    );
    assert_eq!(before.len(), 1);
    assert_eq!(table.a.load().len(), 2);
}
