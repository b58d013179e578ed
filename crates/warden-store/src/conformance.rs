//! Behaviour every `Store` implementation must share.
//!
//! Each backend's test module runs these against a fresh instance.

use warden_core::{Keys, PublicKey};

use crate::error::StoreError;
use crate::records::{
    AppRecord, GrantValue, HistoryRecord, KeyRecord, PendingRequest, PermissionGrant,
};
use crate::traits::Store;

pub fn identity(seed: u8) -> PublicKey {
    Keys::from_secret_bytes(&[seed; 32]).unwrap().public_key()
}

pub fn pending(id: &str, created_at: i64) -> PendingRequest {
    PendingRequest {
        id: id.to_string(),
        caller: identity(1),
        method: "sign_event".to_string(),
        params: r#"["{\"kind\":1}"]"#.to_string(),
        created_at,
    }
}

pub async fn dedup_contract(store: &dyn Store) {
    let request = pending("req-1", 10);

    assert!(store.add_pending(&request).await.unwrap());
    assert!(!store.add_pending(&request).await.unwrap());
    assert_eq!(store.get_pending("req-1").await.unwrap(), Some(request));

    store.confirm_pending("req-1", true).await.unwrap();
    assert!(!store.add_pending(&pending("req-1", 20)).await.unwrap());
    assert!(store.get_pending("req-1").await.unwrap().is_none());
}

pub async fn confirm_moves_one_record(store: &dyn Store) {
    store.add_pending(&pending("a", 1)).await.unwrap();
    store.add_pending(&pending("b", 2)).await.unwrap();

    let record = store.confirm_pending("a", true).await.unwrap();
    assert!(record.allowed);

    let pending = store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "b");

    let history = store.list_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, "a");
    assert!(history[0].allowed);
    assert_eq!(history[0].params, r#"["{\"kind\":1}"]"#);

    // Second confirm has nothing left to move.
    let err = store.confirm_pending("a", false).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(store.list_history().await.unwrap().len(), 1);
}

pub async fn add_confirmed_contract(store: &dyn Store) {
    let record = HistoryRecord {
        id: "direct".to_string(),
        caller: identity(2),
        method: "connect".to_string(),
        params: "[]".to_string(),
        allowed: true,
        timestamp: 5,
    };

    assert!(store.add_confirmed(&record).await.unwrap());
    assert!(!store.add_confirmed(&record).await.unwrap());
    assert!(!store.add_pending(&pending("direct", 6)).await.unwrap());

    // A pending row is superseded by a direct history insert.
    store.add_pending(&pending("elsewhere", 7)).await.unwrap();
    let answered = HistoryRecord {
        id: "elsewhere".to_string(),
        ..record.clone()
    };
    assert!(store.add_confirmed(&answered).await.unwrap());
    assert!(store.list_pending().await.unwrap().is_empty());

    let mine = store.history_for(&identity(2)).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(store.history_for(&identity(3)).await.unwrap().is_empty());
}

pub async fn permission_contract(store: &dyn Store) {
    let caller = identity(4);
    let grant = PermissionGrant {
        caller,
        verb: "sign_event:1".to_string(),
        value: GrantValue::Allow,
        granted_at: 1,
    };

    assert!(store
        .get_permission(&caller, "sign_event:1")
        .await
        .unwrap()
        .is_none());
    store.put_permission(&grant).await.unwrap();
    assert_eq!(
        store.get_permission(&caller, "sign_event:1").await.unwrap(),
        Some(grant.clone())
    );

    // Last write wins.
    let denied = PermissionGrant {
        value: GrantValue::Deny,
        granted_at: 2,
        ..grant.clone()
    };
    store.put_permission(&denied).await.unwrap();
    let all = store.list_permissions(&caller).await.unwrap();
    assert_eq!(all, vec![denied]);

    assert!(store.delete_permission(&caller, "sign_event:1").await.unwrap());
    assert!(!store.delete_permission(&caller, "sign_event:1").await.unwrap());
    assert!(store.list_permissions(&caller).await.unwrap().is_empty());
}

pub async fn app_and_key_contract(store: &dyn Store) {
    let holder = identity(5);
    let app = AppRecord {
        app: identity(6),
        key: holder,
        name: Some("Notes".to_string()),
        url: Some("https://notes.example".to_string()),
        icon: None,
        created_at: 100,
        updated_at: 100,
    };
    store.put_app(&app).await.unwrap();
    store
        .put_permission(&PermissionGrant {
            caller: app.app,
            verb: "basic".to_string(),
            value: GrantValue::Allow,
            granted_at: 100,
        })
        .await
        .unwrap();

    assert_eq!(store.get_app(&app.app).await.unwrap(), Some(app.clone()));
    assert_eq!(store.list_apps(&holder).await.unwrap(), vec![app.clone()]);
    assert!(store.list_apps(&identity(7)).await.unwrap().is_empty());

    assert!(store.delete_app(&app.app).await.unwrap());
    assert!(store.get_app(&app.app).await.unwrap().is_none());
    assert!(store.list_permissions(&app.app).await.unwrap().is_empty());

    let key = KeyRecord {
        key: holder,
        name: Some("main".to_string()),
        encrypted_key: "opaque-blob".to_string(),
        created_at: 1,
    };
    store.put_key(&key).await.unwrap();
    assert_eq!(store.get_key(&holder).await.unwrap(), Some(key.clone()));
    assert_eq!(store.list_keys().await.unwrap(), vec![key]);
    assert!(store.delete_key(&holder).await.unwrap());
    assert!(store.list_keys().await.unwrap().is_empty());
}
