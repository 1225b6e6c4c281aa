use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xxhash_rust::xxh3::xxh3_64;

use pkv_engine::{clock, Cache, Options};

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn cache_with(options: Options) -> Cache {
    Cache::new(options).expect("cache")
}

fn small_cache() -> Cache {
    cache_with(Options {
        shard_count: 16,
        ..Default::default()
    })
}

fn past_deadline() -> i64 {
    clock::now_nanos() - 2 * NANOS_PER_SEC
}

#[test]
fn set_get_remove_roundtrip() {
    let cache = small_cache();

    cache.set(b"foo", b"bar");
    assert_eq!(cache.get(b"foo"), Some((b"bar".to_vec(), 0)));

    assert!(cache.remove(b"foo"));
    assert_eq!(cache.get(b"foo"), None);
    assert!(!cache.remove(b"foo"));
}

#[test]
fn values_survive_until_their_deadline() {
    let cache = small_cache();

    cache.set_ex(b"k", b"v", Duration::from_secs(30));
    let (val, ttl) = cache.get(b"k").expect("hit before the deadline");
    assert_eq!(val, b"v");

    // Deadlines are stored at second granularity; allow the rounding.
    let expected = clock::now_nanos() + 30 * NANOS_PER_SEC;
    assert!((ttl - expected).abs() <= 2 * NANOS_PER_SEC);
}

#[test]
fn past_deadlines_read_as_misses_immediately() {
    let cache = small_cache();

    cache.set_tx(b"k", b"v", past_deadline());
    assert_eq!(cache.get(b"k"), None);
    assert!(!cache.remove(b"k"));
    assert!(!cache.set_ttl(b"k", clock::now_nanos() + 60 * NANOS_PER_SEC));
}

#[test]
fn entries_expire_on_the_wall_clock() {
    let cache = small_cache();

    cache.set_ex(b"k", b"v", Duration::from_millis(1200));
    assert!(cache.get(b"k").is_some());

    // Second-granularity deadlines expire within a couple of seconds.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if cache.get(b"k").is_none() {
            break;
        }
        assert!(Instant::now() < deadline, "entry never expired");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn set_ttl_extends_a_live_entry() {
    let cache = small_cache();

    cache.set_ex(b"k", b"v", Duration::from_secs(5));
    let far = clock::now_nanos() + 3600 * NANOS_PER_SEC;
    assert!(cache.set_ttl(b"k", far));

    let (_, ttl) = cache.get(b"k").expect("hit");
    assert!((ttl - far).abs() <= 2 * NANOS_PER_SEC);

    assert!(!cache.set_ttl(b"missing", far));
}

#[test]
fn overwrite_replaces_the_value_and_accounts_dead_bytes() {
    let cache = small_cache();

    cache.set(b"k", b"short");
    cache.set(b"k", b"a much longer value");
    assert_eq!(cache.get(b"k"), Some((b"a much longer value".to_vec(), 0)));

    // The first record (2 varint bytes + 1 key byte + 5 value bytes) is dead.
    let stats = cache.stat();
    assert_eq!(stats.len, 1);
    assert_eq!(stats.unused, 8);
}

#[test]
fn keys_are_independent() {
    let cache = small_cache();

    cache.set(b"a", b"1");
    cache.set(b"b", b"2");

    assert!(cache.remove(b"a"));
    assert_eq!(cache.get(b"b"), Some((b"2".to_vec(), 0)));

    cache.set(b"a", b"3");
    assert_eq!(cache.get(b"b"), Some((b"2".to_vec(), 0)));
    assert_eq!(cache.get(b"a"), Some((b"3".to_vec(), 0)));
}

#[test]
fn churn_triggers_compaction() {
    let cache = cache_with(Options {
        shard_count: 1,
        migrate_ratio: 0.4,
        migrate_delta: 16,
        ..Default::default()
    });

    for byte in b'a'..=b'z' {
        cache.set(&[byte], &[0x11; 32]);
    }
    for byte in b'a'..=b'z' {
        cache.set(&[byte], &[0x22; 32]);
    }

    let stats = cache.stat();
    assert!(stats.migrations >= 1, "churn never compacted: {stats}");

    cache.migrate();
    let stats = cache.stat();
    assert_eq!(stats.unused, 0);
    assert_eq!(stats.len, 26);
    for byte in b'a'..=b'z' {
        assert_eq!(cache.get(&[byte]), Some((vec![0x22; 32], 0)));
    }
}

#[test]
fn a_weak_fingerprint_still_resolves_every_key() {
    // Truncating the fingerprint to 16 bits forces heavy conflict-map
    // traffic while shard selection stays on its own hash.
    let cache = cache_with(Options {
        shard_count: 4,
        hash_fn: Arc::new(|key: &[u8]| xxh3_64(key) & 0xFFFF),
        ..Default::default()
    });

    let mut rng = StdRng::seed_from_u64(0x5EED);
    let keys: Vec<[u8; 16]> = (0..100_000).map(|_| rng.gen()).collect();

    for (i, key) in keys.iter().enumerate() {
        cache.set(key, &(i as u64).to_le_bytes());
    }
    for (i, key) in keys.iter().enumerate() {
        let (val, _) = cache.get(key).expect("hit");
        assert_eq!(val, (i as u64).to_le_bytes());
    }

    let stats = cache.stat();
    assert!(stats.conflict > 0, "no collisions observed: {stats}");
    assert_eq!(stats.len, 100_000);
}

#[test]
fn conflicting_keys_survive_removal_and_compaction() {
    let cache = cache_with(Options {
        shard_count: 1,
        hash_fn: Arc::new(|_: &[u8]| 1234),
        ..Default::default()
    });

    cache.set(b"first", b"one");
    cache.set(b"second", b"two");
    assert_eq!(cache.stat().conflict, 1);

    assert!(cache.remove(b"first"));
    cache.migrate();

    // The surviving key takes over the freed fingerprint slot.
    let stats = cache.stat();
    assert_eq!(stats.conflict, 0);
    assert_eq!(stats.len, 1);
    assert_eq!(cache.get(b"second"), Some((b"two".to_vec(), 0)));
}

#[test]
fn scan_visits_everything_and_stops_on_demand() {
    let cache = small_cache();
    for i in 0..1000u32 {
        let key = format!("key-{i}");
        cache.set(key.as_bytes(), b"value");
    }

    let mut seen = 0usize;
    cache.scan(|_, _, _| {
        seen += 1;
        true
    });
    assert_eq!(seen, 1000);

    let mut seen = 0usize;
    cache.scan(|_, _, _| {
        seen += 1;
        seen < 10
    });
    assert_eq!(seen, 10);

    // The early stop left the contents untouched.
    assert_eq!(cache.stat().len, 1000);
    assert_eq!(cache.get(b"key-500"), Some((b"value".to_vec(), 0)));
}

#[test]
fn on_remove_observes_removed_and_expired_entries() {
    use std::sync::Mutex;

    let removed: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&removed);
    let cache = cache_with(Options {
        shard_count: 4,
        on_remove: Some(Arc::new(move |key: &[u8], _val: &[u8]| {
            sink.lock().unwrap().push(key.to_vec());
        })),
        ..Default::default()
    });

    cache.set(b"live", b"value");
    cache.set_tx(b"dead", b"value", past_deadline());

    assert!(cache.remove(b"live"));
    cache.migrate();

    let seen = removed.lock().unwrap();
    assert!(seen.contains(&b"live".to_vec()));
    assert!(seen.contains(&b"dead".to_vec()));
}

#[test]
fn parallel_writers_and_readers_stay_consistent() {
    let cache = Arc::new(cache_with(Options {
        shard_count: 64,
        ..Default::default()
    }));

    let mut handles = Vec::new();
    for worker in 0..4u32 {
        let cache = Arc::clone(&cache);
        handles.push(std::thread::spawn(move || {
            for i in 0..2_000u32 {
                let key = format!("w{worker}-{i}");
                cache.set(key.as_bytes(), &i.to_le_bytes());
            }
            for i in 0..2_000u32 {
                let key = format!("w{worker}-{i}");
                let (val, _) = cache.get(key.as_bytes()).expect("own key");
                assert_eq!(val, i.to_le_bytes());
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker");
    }

    assert_eq!(cache.stat().len, 8_000);
}
