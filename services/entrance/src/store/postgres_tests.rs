use super::postgres::PostgresStore;
use super::{AccessLogStore, StoreError, VisitorStore};
use crate::config::DatabaseConfig;
use crate::models::{BanState, NewAccessLog, NewVisitor, VisitRecorded, VisitorFilter, VisitorUpdate};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serial_test::serial;
use sqlx::{Connection, PgConnection};
use tokio::sync::OnceCell;
use uuid::Uuid;

// Run with `ENTRANCE_TEST_DATABASE_URL=postgres://... cargo test -p entrance-registry --features pg-tests`.

static SCHEMA: OnceCell<String> = OnceCell::const_new();

fn base_url() -> Option<String> {
    let url = std::env::var("ENTRANCE_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok();
    if url.is_none() {
        eprintln!("skipping pg-tests: ENTRANCE_TEST_DATABASE_URL not set");
    }
    url
}

/// One schema per test process so runs never see each other's rows
async fn schema(base_url: &str) -> anyhow::Result<String> {
    let schema = SCHEMA
        .get_or_try_init(|| async {
            let schema = format!("entrance_test_{}", Uuid::new_v4().simple());
            let mut conn = PgConnection::connect(base_url).await?;
            sqlx::query(&format!(r#"CREATE SCHEMA IF NOT EXISTS "{schema}""#))
                .execute(&mut conn)
                .await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(schema)
        })
        .await?;
    Ok(schema.clone())
}

fn url_with_schema(base_url: &str, schema: &str) -> String {
    let options = format!("options=-csearch_path%3D{schema}");
    if base_url.contains('?') {
        format!("{base_url}&{options}")
    } else {
        format!("{base_url}?{options}")
    }
}

/// Migrated store over empty tables, or None when no database is configured
async fn store() -> anyhow::Result<Option<PostgresStore>> {
    let Some(base_url) = base_url() else {
        return Ok(None);
    };
    let url = url_with_schema(&base_url, &schema(&base_url).await?);

    let store = PostgresStore::new(&DatabaseConfig {
        url: url.clone(),
        max_connections: 2,
        min_connections: 0,
        connect_timeout_secs: 10,
        idle_timeout_secs: 60,
        run_migrations: true,
    })
    .await?;
    store.run_migrations().await?;

    let mut conn = PgConnection::connect(&url).await?;
    sqlx::query("TRUNCATE visitors, access_logs")
        .execute(&mut conn)
        .await?;
    conn.close().await?;

    Ok(Some(store))
}

fn new_visitor(name: &str, national_id: &str) -> NewVisitor {
    NewVisitor {
        name: name.to_string(),
        national_id: national_id.to_string(),
        photo_ref: "photo_1_abcd1234.jpg".to_string(),
    }
}

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
}

fn banned(reason: &str) -> VisitorUpdate {
    VisitorUpdate::ban(BanState::Banned {
        reason: reason.to_string(),
    })
}

#[tokio::test]
#[serial]
async fn postgres_duplicate_national_id_is_conflict() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };

    let created = VisitorStore::create(&store, new_visitor("Carlos Ferreira", "12345678901")).await?;
    assert_eq!(created.visit_count, 0);
    assert!(!created.is_banned);
    assert!(created.ban_reason.is_none());

    let err = VisitorStore::create(&store, new_visitor("Someone Else", "12345678901"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let found = store.find_by_national_id("12345678901").await?.unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.name, "Carlos Ferreira");
    Ok(())
}

#[tokio::test]
#[serial]
async fn postgres_ban_then_clear_drops_reason() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let visitor = VisitorStore::create(&store, new_visitor("Bruno Santos", "55566677788")).await?;

    let updated = store.update(visitor.id, banned("threatened staff")).await?;
    assert!(updated.is_banned);
    assert_eq!(updated.ban_reason.as_deref(), Some("threatened staff"));
    let found = store.find_banned("55566677788").await?.unwrap();
    assert_eq!(found.ban_reason.as_deref(), Some("threatened staff"));

    let cleared = store
        .update(visitor.id, VisitorUpdate::ban(BanState::Clear))
        .await?;
    assert!(!cleared.is_banned);
    assert!(cleared.ban_reason.is_none());
    assert!(store.find_banned("55566677788").await?.is_none());

    let err = store
        .update(Uuid::new_v4(), VisitorUpdate::ban(BanState::Clear))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    Ok(())
}

#[tokio::test]
#[serial]
async fn postgres_photo_update_keeps_ban_state() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let visitor = VisitorStore::create(&store, new_visitor("Bruno Santos", "55566677788")).await?;
    store.update(visitor.id, banned("fight")).await?;

    let updated = store
        .update(visitor.id, VisitorUpdate::photo("photo_2_ffff0000.jpg"))
        .await?;
    assert_eq!(updated.photo_ref, "photo_2_ffff0000.jpg");
    assert!(updated.is_banned);
    assert_eq!(updated.ban_reason.as_deref(), Some("fight"));

    let unchanged = store.update(visitor.id, VisitorUpdate::default()).await?;
    assert_eq!(unchanged.photo_ref, "photo_2_ffff0000.jpg");
    assert!(unchanged.is_banned);
    Ok(())
}

#[tokio::test]
#[serial]
async fn postgres_record_visit_bumps_stats() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let visitor = VisitorStore::create(&store, new_visitor("Ana Rodrigues", "12345678901")).await?;

    for (apartment, minute) in [("101", 1), ("202", 2)] {
        store
            .record_visit(VisitRecorded {
                visitor_id: visitor.id,
                apartment: apartment.to_string(),
                at: at(minute),
            })
            .await?;
    }

    let updated = store.find_by_id(visitor.id).await?.unwrap();
    assert_eq!(updated.visit_count, 2);
    assert_eq!(updated.last_entry_at, Some(at(2)));
    assert_eq!(updated.last_apartment_visited.as_deref(), Some("202"));

    let err = store
        .record_visit(VisitRecorded {
            visitor_id: Uuid::new_v4(),
            apartment: "101".to_string(),
            at: at(3),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    Ok(())
}

#[tokio::test]
#[serial]
async fn postgres_list_recent_is_newest_first() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let visitor = VisitorStore::create(&store, new_visitor("Ana Rodrigues", "12345678901")).await?;
    let now = Utc::now();

    let mut ids = Vec::new();
    for (minutes_ago, collaborator) in [(30, "Jane"), (1, "null"), (10, "")] {
        let entry = AccessLogStore::create(
            &store,
            NewAccessLog {
                visitor_id: visitor.id,
                destination_apartment: "101".to_string(),
                authorized_by: "João Silva".to_string(),
                collaborator: collaborator.to_string(),
                photo_ref: "photo_1_abcd1234.jpg".to_string(),
                timestamp: now - Duration::minutes(minutes_ago),
            },
        )
        .await?;
        ids.push(entry.id);
    }

    let recent = store.list_recent(2).await?;
    let recent_ids: Vec<Uuid> = recent.iter().map(|e| e.id).collect();
    assert_eq!(recent_ids, vec![ids[1], ids[2]]);
    assert_eq!(recent[0].collaborator, "");

    let all = store.list_recent(10).await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].collaborator, "Jane");
    Ok(())
}

#[tokio::test]
#[serial]
async fn postgres_list_visitors_filters() -> anyhow::Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let carlos = VisitorStore::create(&store, new_visitor("Carlos Ferreira", "11111111111")).await?;
    let beatriz = VisitorStore::create(&store, new_visitor("Beatriz Souza", "22222222222")).await?;
    let carla = VisitorStore::create(&store, new_visitor("Carla 100%", "33311111111")).await?;
    store.update(beatriz.id, banned("fight")).await?;

    let all = store.list(VisitorFilter::default()).await?;
    let ids: Vec<Uuid> = all.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![carla.id, beatriz.id, carlos.id]);

    let only_banned = store.list(VisitorFilter::new(Some(true), None)).await?;
    assert_eq!(only_banned.len(), 1);
    assert_eq!(only_banned[0].id, beatriz.id);

    let by_name = store.list(VisitorFilter::new(None, Some("CAR"))).await?;
    let ids: Vec<Uuid> = by_name.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![carla.id, carlos.id]);

    let by_national_id = store
        .list(VisitorFilter::new(Some(false), Some("1111")))
        .await?;
    assert_eq!(by_national_id.len(), 2);

    let literal = store.list(VisitorFilter::new(None, Some("%"))).await?;
    assert_eq!(literal.len(), 1);
    assert_eq!(literal[0].id, carla.id);
    Ok(())
}
