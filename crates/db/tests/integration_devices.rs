//! Integration-Tests fuer DeviceRepository (In-Memory SQLite)

use devicehub_db::{DbError, DeviceRepository, NeuesGeraet, SqliteDb};

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

#[tokio::test]
async fn geraet_erstellen_und_laden() {
    let db = db().await;

    let geraet = db
        .create(NeuesGeraet {
            name: "kasse-01",
            ip: "10.0.0.7",
        })
        .await
        .expect("Geraet erstellen fehlgeschlagen");

    assert_eq!(geraet.name, "kasse-01");
    assert!(geraet.connect_time.is_none());

    let geladen = db
        .get_by_name("kasse-01")
        .await
        .unwrap()
        .expect("Geraet sollte gefunden werden");

    assert_eq!(geladen.device_id, geraet.device_id);
    assert_eq!(geladen.ip, "10.0.0.7");
}

#[tokio::test]
async fn unbekanntes_geraet_ist_none() {
    let db = db().await;
    assert!(db.get_by_name("gibt-es-nicht").await.unwrap().is_none());
}

#[tokio::test]
async fn doppelter_name_ist_eindeutigkeitsfehler() {
    let db = db().await;
    let neu = NeuesGeraet {
        name: "doppelt",
        ip: "1.2.3.4",
    };

    db.create(neu.clone()).await.unwrap();
    let err = db.create(neu).await.unwrap_err();

    assert!(matches!(err, DbError::Eindeutigkeit(_)));
    assert!(err.ist_eindeutigkeit());
}

#[tokio::test]
async fn connect_time_aktualisieren() {
    let db = db().await;
    let geraet = db
        .create(NeuesGeraet {
            name: "sensor",
            ip: "10.0.0.1",
        })
        .await
        .unwrap();

    db.update_connect_time(geraet.device_id).await.unwrap();

    let geladen = db.get_by_name("sensor").await.unwrap().unwrap();
    assert!(geladen.connect_time.is_some());
}

#[tokio::test]
async fn connect_time_fuer_unbekannte_id() {
    let db = db().await;
    let err = db.update_connect_time(9999).await.unwrap_err();
    assert!(matches!(err, DbError::NichtGefunden(_)));
}

#[tokio::test]
async fn get_or_create_legt_an_und_beruehrt() {
    let db = db().await;

    let erstes = db.get_or_create_and_touch("neu", "10.1.1.1").await.unwrap();
    assert_eq!(erstes.name, "neu");
    assert!(erstes.connect_time.is_some());

    let zweites = db.get_or_create_and_touch("neu", "10.9.9.9").await.unwrap();
    assert_eq!(zweites.device_id, erstes.device_id);
    // IP des ersten Verbindens bleibt erhalten
    assert_eq!(zweites.ip, "10.1.1.1");

    assert_eq!(db.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_or_create_gleichzeitig() {
    let db = db().await;

    let (a, b) = tokio::join!(
        db.get_or_create_and_touch("parallel", "10.0.0.1"),
        db.get_or_create_and_touch("parallel", "10.0.0.2"),
    );

    let a = a.expect("erster Aufruf fehlgeschlagen");
    let b = b.expect("zweiter Aufruf fehlgeschlagen");
    assert_eq!(a.device_id, b.device_id);
    assert_eq!(db.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn liste_ist_nach_name_sortiert() {
    let db = db().await;
    for name in ["zeta", "alpha", "mitte"] {
        db.create(NeuesGeraet { name, ip: "10.0.0.1" }).await.unwrap();
    }

    let namen: Vec<String> = db.list().await.unwrap().into_iter().map(|g| g.name).collect();
    assert_eq!(namen, vec!["alpha", "mitte", "zeta"]);
}
