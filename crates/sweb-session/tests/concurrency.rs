//! Many tasks hammering overlapping session ids.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use sweb_session::{MemoryProvider, ProviderConfig, Session};
use tempfile::TempDir;

async fn assert_index_consistent(provider: &MemoryProvider) {
    let ids = provider.session_ids().await;
    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), ids.len());
    assert_eq!(provider.len().await, ids.len());
    for sid in &ids {
        assert!(provider.has_session(sid).await);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_operations_keep_index_consistent() {
    let provider = Arc::new(MemoryProvider::in_memory(Duration::from_secs(60)).unwrap());

    let mut handles = Vec::new();
    for task in 0..32u32 {
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            for i in 0..300u32 {
                let sid = format!("s{}", (task * 7 + i) % 40);
                match i % 4 {
                    0 | 1 => {
                        let _ = provider
                            .add_new_session(Session::new(provider.new_attributes(sid.as_str())))
                            .await;
                    }
                    2 => {
                        if let Some(session) = provider.get_session(&sid).await {
                            session.attributes().set("n", i).await.unwrap();
                        }
                    }
                    _ => provider.remove_session(&sid).await.unwrap(),
                }
                if i % 50 == 0 {
                    provider.remove_expired().await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_index_consistent(&provider).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_sweep_races_with_promote_and_remove() {
    const COUNT: usize = 400;
    let provider = Arc::new(MemoryProvider::in_memory(Duration::from_secs(10)).unwrap());
    let stale = Utc::now() - chrono::Duration::seconds(60);

    let mut sessions = Vec::with_capacity(COUNT);
    for i in 0..COUNT {
        let session = Session::new(provider.new_attributes(format!("s{i}")));
        session.attributes().set_time_accessed(stale);
        provider.add_new_session(session.clone()).await.unwrap();
        sessions.push(session);
    }
    let sessions = Arc::new(sessions);

    let done = Arc::new(AtomicBool::new(false));
    let sweeper = {
        let provider = Arc::clone(&provider);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut swept = 0;
            while !done.load(Ordering::Acquire) {
                swept += provider.remove_expired().await;
                tokio::task::yield_now().await;
            }
            swept
        })
    };

    // Even ids: touched, then moved to the front.
    let mut touchers = Vec::new();
    for task in 0..4 {
        let provider = Arc::clone(&provider);
        let sessions = Arc::clone(&sessions);
        touchers.push(tokio::spawn(async move {
            let mut kept = Vec::new();
            for i in (task * 2..COUNT).step_by(8) {
                let session = &sessions[i];
                session.attributes().touch();
                if provider.get_session(session.id()).await.is_some() {
                    kept.push(session.id().to_string());
                }
            }
            kept
        }));
    }

    // Ids 1 mod 4: removed while the sweep may be looking at them.
    let mut removers = Vec::new();
    for task in 0..2 {
        let provider = Arc::clone(&provider);
        removers.push(tokio::spawn(async move {
            for i in (task * 4 + 1..COUNT).step_by(8) {
                provider.remove_session(&format!("s{i}")).await.unwrap();
            }
        }));
    }

    let mut kept = Vec::new();
    for toucher in touchers {
        kept.extend(toucher.await.unwrap());
    }
    for remover in removers {
        remover.await.unwrap();
    }
    done.store(true, Ordering::Release);
    sweeper.await.unwrap();

    assert_index_consistent(&provider).await;
    for sid in &kept {
        assert!(provider.has_session(sid).await, "touched session {sid} was evicted");
    }
    for i in (1..COUNT).step_by(4) {
        assert!(!provider.has_session(&format!("s{i}")).await);
    }

    // Whatever the sweep has not reached yet is still stale.
    provider.remove_expired().await;
    assert_eq!(provider.len().await, kept.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logout_is_not_undone_by_concurrent_reads() {
    let dir = TempDir::new().unwrap();
    let config = ProviderConfig::new()
        .with_timeout(Duration::from_secs(60))
        .with_save_path(dir.path());
    let provider = Arc::new(MemoryProvider::new(config).unwrap());

    for round in 0..100 {
        let sid = format!("s{round}");
        let session = Session::new(provider.new_attributes(sid.as_str()));
        provider.add_new_session(session.clone()).await.unwrap();
        session.attributes().set("uid", round).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let mut readers = Vec::new();
        for _ in 0..4 {
            let provider = Arc::clone(&provider);
            let stop = Arc::clone(&stop);
            let sid = sid.clone();
            readers.push(tokio::spawn(async move {
                while !stop.load(Ordering::Acquire) {
                    let _ = provider.get_session(&sid).await;
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::task::yield_now().await;
        provider.remove_session(&sid).await.unwrap();
        stop.store(true, Ordering::Release);
        for reader in readers {
            reader.await.unwrap();
        }

        assert!(!provider.has_session(&sid).await, "{sid} came back after logout");
        assert!(!dir.path().join(&sid).exists());
    }
}
