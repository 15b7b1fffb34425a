#![cfg(feature = "db-tests")]

//! Store behaviour against a live PostgreSQL database.
//!
//! Run with `--features db-tests` and the `DB_*` variables pointing at a
//! throwaway database.

use chrono::{Duration, Utc};
use serde_json::json;

use ecoimpact_common::config::ConnectionConfig;
use ecoimpact_common::error::DataError;
use ecoimpact_common::impact::{ImpactEvent, ImpactSummary, ImpactWindow};
use ecoimpact_common::schema::{PRODUCTS, PRODUCT_INFORMATION, USERS};
use ecoimpact_common::value::{normalize, SqlValue};
use ecoimpact_db_integration::{create_user, fresh_database, record_impact_at};
use ecoimpact_store::auth::{CredentialVerifier, PlaintextCredentials};
use ecoimpact_store::postgres::PgConnector;
use ecoimpact_store::{Connector, Store};

#[tokio::test]
async fn empty_table_lists_nothing() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    let records = store.list(&PRODUCTS).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn unknown_id_is_absent() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    assert!(store.get(&PRODUCTS, SqlValue::Int(404)).await.unwrap().is_none());
}

#[tokio::test]
async fn id_beyond_the_integer_column_is_absent() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);
    create_user(&store, "ada").await;

    let huge = SqlValue::Int(9_999_999_999);
    assert!(store.get(&PRODUCTS, huge.clone()).await.unwrap().is_none());
    assert!(store.get(&USERS, huge.clone()).await.unwrap().is_none());
    assert!(store
        .list_where(&USERS, "userID", huge)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn impact_for_id_beyond_the_integer_column_is_zero() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    let summary = store
        .summarize_impact(9_999_999_999, ImpactWindow::default().start_at(Utc::now()))
        .await
        .unwrap();
    assert_eq!(summary, ImpactSummary::ZERO);
}

#[tokio::test]
async fn oversized_integer_write_is_rejected() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    let err = store
        .record_impact(&ImpactEvent {
            user_id: 9_999_999_999,
            ghg: 1.0,
            water: 1.0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)), "{err}");
}

#[tokio::test]
async fn written_record_reads_back_normalized() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    store
        .insert(
            PRODUCTS.table,
            &["ProductName", "ProductCategory", "ProductImage"],
            &[SqlValue::from("Bottle"), SqlValue::from("Kitchen"), SqlValue::Null],
        )
        .await
        .unwrap();

    let fields = PRODUCT_INFORMATION.insert_fields();
    let values = vec![
        SqlValue::Bool(true),
        SqlValue::Float(2.5),
        SqlValue::Float(10.25),
        SqlValue::Float(3.0),
        SqlValue::Float(1.5),
        SqlValue::from("Breaks down in 6 months"),
        SqlValue::from("Mostly transport"),
        SqlValue::Null,
        SqlValue::from("Two shifts"),
        SqlValue::Int(1),
    ];
    store
        .insert(PRODUCT_INFORMATION.table, &fields, &values)
        .await
        .unwrap();

    let record = store
        .get(&PRODUCT_INFORMATION, SqlValue::Int(1))
        .await
        .unwrap()
        .expect("inserted row should be readable");
    assert_eq!(record["InformationID"], json!(1));
    for (field, value) in fields.iter().zip(values) {
        assert_eq!(record[*field], normalize(value).unwrap(), "field {field}");
    }
}

#[tokio::test]
async fn decimals_read_as_floats() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    store
        .insert(
            PRODUCT_INFORMATION.table,
            &["Product_GreenHouseGas"],
            &[SqlValue::from("12.50")],
        )
        .await
        .unwrap();

    let record = store
        .get(&PRODUCT_INFORMATION, SqlValue::Int(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["Product_GreenHouseGas"], json!(12.5));
}

#[tokio::test]
async fn no_events_is_zero_impact() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);
    let user_id = create_user(&store, "ada").await;

    let summary = store
        .summarize_impact(user_id, ImpactWindow::default().start_at(Utc::now()))
        .await
        .unwrap();
    assert_eq!(summary, ImpactSummary::ZERO);
}

#[tokio::test]
async fn impact_sums_only_the_window() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector.clone());
    let user_id = create_user(&store, "ada").await;
    let other = create_user(&store, "grace").await;

    for (ghg, water) in [(2.0, 10.0), (3.0, 5.0)] {
        store
            .record_impact(&ImpactEvent {
                user_id,
                ghg,
                water,
            })
            .await
            .unwrap();
    }
    let now = Utc::now();
    record_impact_at(&connector, user_id, 100.0, 100.0, now - Duration::hours(48)).await;
    store
        .record_impact(&ImpactEvent {
            user_id: other,
            ghg: 7.0,
            water: 7.0,
        })
        .await
        .unwrap();

    let summary = store
        .summarize_impact(user_id, ImpactWindow::default().start_at(now))
        .await
        .unwrap();
    assert_eq!(
        summary,
        ImpactSummary {
            total_ghg: 5.0,
            total_water: 15.0,
        }
    );
}

#[tokio::test]
async fn credentials_match_on_username_and_password() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector.clone());
    let user_id = create_user(&store, "ada").await;
    let verifier = PlaintextCredentials::new(connector);

    assert_eq!(verifier.verify("ada", "pw").await.unwrap(), Some(json!(user_id)));
    assert_eq!(verifier.verify("ada", "nope").await.unwrap(), None);
    assert_eq!(verifier.verify("nobody", "pw").await.unwrap(), None);
}

#[tokio::test]
async fn constraint_violation_is_a_write_error() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);
    create_user(&store, "ada").await;

    let err = store
        .insert(
            USERS.table,
            &["Username", "Password"],
            &[SqlValue::from("ada"), SqlValue::from("secret-value")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Write(_)), "{err}");
    assert!(!err.to_string().contains("secret-value"));
}

#[tokio::test]
async fn unknown_column_is_a_query_error() {
    let (_guard, connector) = fresh_database().await;
    let store = Store::new(connector);

    let err = store
        .insert(USERS.table, &["Nickname"], &[SqlValue::from("ada")])
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)), "{err}");

    let err = store
        .fetch_all(USERS.table, &["Nickname"])
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Query(_)), "{err}");
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let connector = PgConnector::new(&ConnectionConfig {
        server: "127.0.0.1:1".to_string(),
        database: "eco".to_string(),
        user: "svc".to_string(),
        password: "pw".to_string(),
        encrypt: false,
        trust_server_certificate: false,
        timeout_seconds: 2,
    })
    .unwrap();

    assert!(matches!(
        connector.connect().await,
        Err(DataError::Connection(_))
    ));
    let err = Store::new(connector).list(&PRODUCTS).await.unwrap_err();
    assert!(matches!(err, DataError::Connection(_)));
}
