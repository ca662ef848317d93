//! Reconciliation tests for ImportKeyPair against the mock provider

#[cfg(test)]
mod tests {
    use crate::credentials::CredentialError;
    use crate::error::ControllerError;
    use crate::finalizer;
    use crate::store::ResourceKey;
    use crate::test_utils::*;
    use crds::*;
    use digitalocean_client::{DigitalOceanError, Key, MockFailure, MockOperation};

    fn status_of(harness: &TestHarness, key: &ResourceKey) -> ImportKeyPairStatus {
        harness
            .key_pairs
            .get(key)
            .and_then(|k| k.status)
            .unwrap_or_default()
    }

    fn foreign_key(id: u64, name: &str, public_key: &str) -> Key {
        Key {
            id,
            name: name.to_string(),
            fingerprint: "00:11:22:33".to_string(),
            public_key: public_key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_import_in_one_pass() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", &format!("  {PUBLIC_KEY}\n")));

        let outcome = harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        assert!(!outcome.requeue);

        let status = status_of(&harness, &key);
        assert_eq!(status.lifecycle_state, KeyPairState::Provisioned);
        let id = status.id.expect("key id recorded");
        let imported = harness.provider.key(id).unwrap();
        assert_eq!(status.finger_print.as_deref(), Some(imported.fingerprint.as_str()));
        assert_eq!(imported.name, "droplet-operator-uid-k1");
        assert_eq!(imported.public_key, PUBLIC_KEY);
        assert!(status.message.is_none());
        assert!(finalizer::is_present(&harness.key_pairs.get(&key).unwrap().metadata));
    }

    #[tokio::test]
    async fn test_repeated_passes_import_once() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));

        for _ in 0..3 {
            harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        }

        assert_eq!(harness.provider.call_count(MockOperation::CreateKey), 1);
        assert_eq!(harness.provider.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_public_key_is_rejected_before_provider() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", "not-a-key"));

        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidSpec(_)), "{err}");
        assert!(harness.factory.tokens().is_empty());

        let status = status_of(&harness, &key);
        assert_eq!(status.lifecycle_state, KeyPairState::Empty);
        assert!(status.message.as_deref().unwrap().contains("spec.publicKey"));
    }

    #[tokio::test]
    async fn test_lost_import_response_is_adopted() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));
        harness
            .provider
            .fail_next(MockOperation::CreateKey, MockFailure::ResponseLost);

        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::DigitalOcean(DigitalOceanError::Transient(_))));
        assert_eq!(status_of(&harness, &key).lifecycle_state, KeyPairState::CreateRequested);

        harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        let status = status_of(&harness, &key);
        assert_eq!(status.lifecycle_state, KeyPairState::Provisioned);
        assert_eq!(status.id, Some(harness.provider.keys()[0].id));
        assert!(status.message.is_none());
        assert_eq!(harness.provider.call_count(MockOperation::CreateKey), 1);
        assert_eq!(harness.provider.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_key_already_in_account_is_reported() {
        let harness = TestHarness::new();
        harness.provider.add_key(foreign_key(1, "laptop", PUBLIC_KEY));
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));

        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::DigitalOcean(DigitalOceanError::Validation(_))));

        let status = status_of(&harness, &key);
        assert_eq!(status.lifecycle_state, KeyPairState::CreateRequested);
        assert!(status.message.as_deref().unwrap().contains("already in use"));

        // Recovery does not adopt a key imported under another name
        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::DigitalOcean(DigitalOceanError::Validation(_))));
        assert!(status_of(&harness, &key).id.is_none());
    }

    #[tokio::test]
    async fn test_user_key_with_same_name_is_never_adopted_or_deleted() {
        let harness = TestHarness::new();
        harness.provider.add_key(foreign_key(1, "k1", PUBLIC_KEY));
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));

        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::DigitalOcean(DigitalOceanError::Validation(_))));
        assert_eq!(status_of(&harness, &key).lifecycle_state, KeyPairState::CreateRequested);

        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::DigitalOcean(DigitalOceanError::Validation(_))));
        assert!(status_of(&harness, &key).id.is_none());
        assert_eq!(harness.provider.call_count(MockOperation::ListKeys), 1);

        harness.key_pairs.request_deletion(&key);
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();

        assert!(harness.key_pairs.get(&key).is_none());
        assert_eq!(harness.provider.call_count(MockOperation::DeleteKey), 0);
        let kept = harness.provider.key(1).expect("user key kept");
        assert_eq!(kept.name, "k1");
    }

    #[tokio::test]
    async fn test_delete_removes_key_then_finalizer() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        let id = status_of(&harness, &key).id.unwrap();

        harness.key_pairs.request_deletion(&key);
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();

        assert!(harness.provider.key(id).is_none());
        assert!(harness.key_pairs.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_delete_of_already_removed_key_succeeds() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        harness
            .provider
            .fail_next(MockOperation::DeleteKey, MockFailure::NotFound);

        harness.key_pairs.request_deletion(&key);
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();

        assert!(harness.key_pairs.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_finalizer() {
        let harness = TestHarness::new();
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        let id = status_of(&harness, &key).id.unwrap();
        harness
            .provider
            .fail_next(MockOperation::DeleteKey, MockFailure::Unauthorized);

        harness.key_pairs.request_deletion(&key);
        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::DigitalOcean(DigitalOceanError::Unauthorized(_))));
        let stored = harness.key_pairs.get(&key).expect("object kept");
        assert!(finalizer::is_present(&stored.metadata));
        assert!(harness.provider.key(id).is_some());

        harness.reconciler.reconcile_key_pair(&key).await.unwrap();
        assert!(harness.key_pairs.get(&key).is_none());
        assert!(harness.provider.key(id).is_none());
    }

    #[tokio::test]
    async fn test_delete_without_id_spares_foreign_keys() {
        let harness = TestHarness::new();
        let other = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOther other@example";
        harness.provider.add_key(foreign_key(1, "laptop", PUBLIC_KEY));
        harness.provider.add_key(foreign_key(2, "k1", other));
        harness.provider.add_key(foreign_key(3, "droplet-operator-uid-k1", other));

        let mut resource = key_pair("k1", PUBLIC_KEY);
        resource.status = Some(ImportKeyPairStatus {
            lifecycle_state: KeyPairState::CreateRequested,
            ..Default::default()
        });
        finalizer::ensure_present(&mut resource.metadata);
        let key = harness.key_pairs.insert(resource);

        harness.key_pairs.request_deletion(&key);
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();

        assert!(harness.provider.key(1).is_some(), "user key");
        assert!(harness.provider.key(2).is_some(), "user key named after the resource");
        assert!(harness.provider.key(3).is_none());
        assert!(harness.key_pairs.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_delete_of_never_imported_key_skips_provider() {
        let harness = TestHarness::new();
        let mut resource = key_pair("k1", PUBLIC_KEY);
        finalizer::ensure_present(&mut resource.metadata);
        let key = harness.key_pairs.insert(resource);

        harness.key_pairs.request_deletion(&key);
        harness.reconciler.reconcile_key_pair(&key).await.unwrap();

        assert!(harness.key_pairs.get(&key).is_none());
        assert!(harness.factory.tokens().is_empty());
        assert_eq!(harness.provider.call_count(MockOperation::ListKeys), 0);
    }

    #[tokio::test]
    async fn test_missing_secret_is_reported() {
        let harness = TestHarness::new();
        harness.secrets.remove(NAMESPACE, SECRET);
        let key = harness.key_pairs.insert(key_pair("k1", PUBLIC_KEY));

        let err = harness.reconciler.reconcile_key_pair(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::Credential(CredentialError::NotFound { .. })), "{err}");
        assert_eq!(harness.provider.call_count(MockOperation::CreateKey), 0);
        assert!(status_of(&harness, &key).message.is_some());
    }

    #[tokio::test]
    async fn test_deleting_object_without_finalizer_is_left_alone() {
        let harness = TestHarness::new();
        let mut resource = key_pair("k1", PUBLIC_KEY);
        resource.metadata.deletion_timestamp = Some(deletion_time());
        let key = harness.key_pairs.insert(resource);

        harness.reconciler.reconcile_key_pair(&key).await.unwrap();

        assert_eq!(harness.key_pairs.save_count(), 0);
        assert!(harness.factory.tokens().is_empty());
    }
}
