use rand::Rng;
use splinter::HashMap;
use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::thread;

const FIDDLERS: &[&str] = &["fiddlerA", "fiddlerB", "fiddlerC", "fiddlerD"];

/// One fiddler works 100 random keys in its own prefix space: put them,
/// check them, overwrite them checking the prior value, check again, delete
/// them checking the removed value, and finally check that they are gone.
fn fiddle(map: &HashMap<String, String>, prefix: &str) {
    let mut rng = rand::thread_rng();
    let guard = map.guard();

    let mut mine = StdHashMap::new();
    while mine.len() < 100 {
        let key = format!("{}{}", prefix, rng.gen::<u32>());
        let value = format!("{}value", key);
        map.insert(key.clone(), value.clone(), &guard);
        mine.insert(key, value);
    }
    for (k, v) in &mine {
        assert_eq!(map.get(k, &guard), Some(v));
    }
    for (k, v) in &mut mine {
        let next = format!("{}.2", v);
        assert_eq!(map.insert(k.clone(), next.clone(), &guard).cloned(), Some(v.clone()));
        *v = next;
    }
    for (k, v) in &mine {
        assert_eq!(map.get(k, &guard), Some(v));
    }
    for (k, v) in &mine {
        assert_eq!(map.remove(k, &guard), Some(v));
    }
    for (k, _) in &mine {
        assert_eq!(map.remove(k, &guard), None);
    }
    for (k, _) in &mine {
        assert_eq!(map.get(k, &guard), None);
    }
}

#[test]
fn fiddlers_leave_shared_keys_intact() {
    let map = Arc::new(HashMap::new());
    let mut shared = StdHashMap::new();
    {
        let guard = map.guard();
        for i in 0..100 {
            let key = format!("key{}", i);
            let value = format!("value{}", i);
            map.insert(key.clone(), value.clone(), &guard);
            shared.insert(key, value);
        }
    }

    let handles: Vec<_> = FIDDLERS
        .iter()
        .map(|&prefix| {
            let map = Arc::clone(&map);
            thread::spawn(move || fiddle(&map, prefix))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // only the pre-populated keys remain, untouched
    let guard = map.guard();
    assert_eq!(map.verify(&guard), Ok(()));
    assert_eq!(map.len(), shared.len());
    assert_eq!(map.to_hash_map(&guard), shared);
    for (k, v) in &shared {
        assert_eq!(map.get(k, &guard), Some(v));
    }
}

#[test]
fn concurrent_insert() {
    let map = Arc::new(HashMap::<usize, usize>::new());

    let map1 = Arc::clone(&map);
    let t1 = thread::spawn(move || {
        for i in 0..64 {
            map1.insert(i, 0, &map1.guard());
        }
    });
    let map2 = Arc::clone(&map);
    let t2 = thread::spawn(move || {
        for i in 0..64 {
            map2.insert(i, 1, &map2.guard());
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    let guard = map.guard();
    for i in 0..64 {
        let v = map.get(&i, &guard).unwrap();
        assert!(v == &0 || v == &1);
    }
    assert_eq!(map.len(), 64);
    assert_eq!(map.verify(&guard), Ok(()));
}

#[test]
fn concurrent_remove() {
    let map = Arc::new(HashMap::<usize, usize>::new());

    {
        let guard = map.guard();
        for i in 0..64 {
            map.insert(i, i, &guard);
        }
    }

    let map1 = Arc::clone(&map);
    let t1 = thread::spawn(move || {
        let guard = map1.guard();
        for i in 0..64 {
            if let Some(v) = map1.remove(&i, &guard) {
                assert_eq!(v, &i);
            }
        }
    });
    let map2 = Arc::clone(&map);
    let t2 = thread::spawn(move || {
        let guard = map2.guard();
        for i in 0..64 {
            if let Some(v) = map2.remove(&i, &guard) {
                assert_eq!(v, &i);
            }
        }
    });

    t1.join().unwrap();
    t2.join().unwrap();

    // after joining the threads, the map should be empty
    let guard = map.guard();
    for i in 0..64 {
        assert!(map.get(&i, &guard).is_none());
    }
    assert_eq!(map.len(), 0);
    assert_eq!(map.verify(&guard), Ok(()));
}

#[test]
fn concurrent_growth() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1 << 10;

    let map = Arc::new(HashMap::<usize, usize>::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let guard = map.guard();
                for i in 0..PER_THREAD {
                    let key = t * PER_THREAD + i;
                    assert_eq!(map.insert(key, !key, &guard), None);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // every thread's entries survive the concurrent grows
    let guard = map.guard();
    assert_eq!(map.len(), THREADS * PER_THREAD);
    assert_eq!(map.verify(&guard), Ok(()));
    for key in 0..THREADS * PER_THREAD {
        assert_eq!(map.get(&key, &guard), Some(&!key));
    }
}

#[test]
fn concurrent_overwrite_single_key() {
    let map = Arc::new(HashMap::<&'static str, usize>::new());
    map.pin().insert("contended", 0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let guard = map.guard();
                for i in 0..1000 {
                    // every overwrite must observe *some* prior value
                    assert!(map.insert("contended", i, &guard).is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), 1);
    assert!(map.pin().get(&"contended").is_some());
    assert_eq!(map.pin().verify(), Ok(()));
}
