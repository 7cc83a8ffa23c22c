//! Redis backend checks. They need a running server and are skipped unless
//! `RENTGATE_TEST_REDIS_URL` is set (for example `redis://127.0.0.1:6379/15`).

use anyhow::Result;
use rentgate::store::{CappedPush, RedisConfig, RedisStore, TtlStore, group_overflow};
use std::time::Duration;

const LIST: &str = "user:sessions:test";

async fn store() -> Result<Option<RedisStore>> {
    let Ok(url) = std::env::var("RENTGATE_TEST_REDIS_URL") else {
        eprintln!("Skipping Redis test: RENTGATE_TEST_REDIS_URL is not set");
        return Ok(None);
    };
    let prefix = format!("rentgate-test:{}", ulid::Ulid::new());
    let config = RedisConfig::new(url).with_key_prefix(prefix);
    Ok(Some(RedisStore::connect(config).await?))
}

fn cap(prefix: &str, max: usize) -> CappedPush<'_> {
    CappedPush {
        group_prefix: prefix,
        max,
        ttl: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn push_capped_script_evicts_like_group_overflow() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };

    let mut expected: Vec<String> = Vec::new();
    for member in ["access:1", "refresh:1", "access:2", "access:3", "refresh:2", "access:4"] {
        let prefix = if member.starts_with("access:") {
            "access:"
        } else {
            "refresh:"
        };
        expected.push(member.to_string());
        let overflow = group_overflow(expected.iter().map(String::as_str), prefix, 2);
        expected.retain(|item| !overflow.contains(item));

        let evicted = store.push_capped(LIST, member, cap(prefix, 2)).await?;
        assert_eq!(evicted, overflow, "after pushing {member}");
    }

    assert_eq!(
        store.list_members(LIST).await?,
        vec!["refresh:1", "access:3", "refresh:2", "access:4"]
    );
    assert_eq!(store.list_members(LIST).await?, expected);

    store.delete(LIST).await?;
    Ok(())
}

#[tokio::test]
async fn take_hands_out_a_value_once() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };

    store
        .set("session:refresh:once", b"record", Duration::from_secs(60))
        .await?;
    assert_eq!(
        store.take("session:refresh:once").await?,
        Some(b"record".to_vec())
    );
    assert_eq!(store.take("session:refresh:once").await?, None);
    Ok(())
}
