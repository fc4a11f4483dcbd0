//! Replica checkpoints
//!
//! Before a workload is scaled to zero its replica count is written to the
//! [`DESIRED_REPLICAS_ANNOTATION`] annotation on the workload itself. Scaling
//! back up reads that annotation again. The annotation is the only state this
//! crate persists: one decimal int32 per workload, written with a JSON merge
//! patch so every other annotation is left alone.
//!
//! A missing or unreadable checkpoint is not an error. The workload is
//! treated as having no recorded count and restored to zero replicas, so one
//! corrupted annotation cannot abort a whole run.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, warn};

use crate::client::{WorkloadClient, WorkloadRef};
use crate::scaler::ScaleDirection;
use crate::Result;

/// Annotation key holding the replica count recorded before scale-down
pub const DESIRED_REPLICAS_ANNOTATION: &str = "k8s.dev.scaler/desired.replicas";

/// Encode a replica count as an annotation value
pub fn encode_replicas(replicas: i32) -> String {
    replicas.to_string()
}

/// Decode an annotation value into a replica count
///
/// Returns `None` when the value is absent, not a decimal integer, out of
/// int32 range, or negative.
pub fn decode_replicas(value: Option<&str>) -> Option<i32> {
    value?.parse::<i32>().ok().filter(|n| *n >= 0)
}

/// Decode the checkpoint from a workload's annotation map
pub fn decode_from_annotations(annotations: &BTreeMap<String, String>) -> Option<i32> {
    decode_replicas(
        annotations
            .get(DESIRED_REPLICAS_ANNOTATION)
            .map(String::as_str),
    )
}

/// JSON merge patch that sets the checkpoint annotation and nothing else
pub fn checkpoint_patch(replicas: i32) -> serde_json::Value {
    json!({
        "metadata": {
            "annotations": {
                DESIRED_REPLICAS_ANNOTATION: encode_replicas(replicas)
            }
        }
    })
}

/// Read/write protocol for checkpoints over one workload client
///
/// The store decides what a workload's replica count should become for a
/// given direction. It never touches the scale subresource itself.
pub struct CheckpointStore<'a> {
    client: &'a dyn WorkloadClient,
}

impl<'a> CheckpointStore<'a> {
    /// Create a store over the given client
    pub fn new(client: &'a dyn WorkloadClient) -> Self {
        Self { client }
    }

    /// Record `replicas` as the workload's checkpoint
    ///
    /// Any error here must stop the workload from being zeroed, otherwise
    /// its replica count is lost.
    pub async fn record_checkpoint(&self, name: &str, replicas: i32) -> Result<()> {
        self.client
            .patch_annotations(name, &checkpoint_patch(replicas))
            .await?;
        debug!(
            kind = %self.client.kind(),
            workload = %name,
            replicas,
            "recorded replica checkpoint"
        );
        Ok(())
    }

    /// Read the workload's checkpoint from the API server
    ///
    /// Always fetches fresh annotations: the checkpoint may have been written
    /// by a different invocation than the one reading it.
    pub async fn read_checkpoint(&self, name: &str) -> Result<Option<i32>> {
        let annotations = self.client.get_annotations(name).await?;
        let checkpoint = decode_from_annotations(&annotations);
        if checkpoint.is_none() {
            match annotations.get(DESIRED_REPLICAS_ANNOTATION) {
                Some(raw) => warn!(
                    kind = %self.client.kind(),
                    workload = %name,
                    value = %raw,
                    "unreadable replica checkpoint, restoring to 0"
                ),
                None => debug!(
                    kind = %self.client.kind(),
                    workload = %name,
                    "no replica checkpoint, restoring to 0"
                ),
            }
        }
        Ok(checkpoint)
    }

    /// Work out the replica count a workload should be scaled to
    ///
    /// - `Down` records the current count first and only then returns 0.
    ///   If the record fails the error is returned and no target is produced.
    /// - `Up` returns the recorded count, or 0 when there is none.
    pub async fn resolve_target_replicas(
        &self,
        workload: &WorkloadRef,
        direction: ScaleDirection,
    ) -> Result<i32> {
        match direction {
            ScaleDirection::Down => {
                self.record_checkpoint(&workload.name, workload.current_replicas)
                    .await?;
                Ok(0)
            }
            ScaleDirection::Up => Ok(self.read_checkpoint(&workload.name).await?.unwrap_or(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockWorkloadClient, WorkloadKind};
    use crate::Error;
    use kube::core::ErrorResponse;
    use mockall::predicate::eq;

    fn conflict() -> Error {
        Error::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }))
    }

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn deployment(name: &str, replicas: i32) -> WorkloadRef {
        WorkloadRef::new(WorkloadKind::Deployment, "default", name, replicas)
    }

    fn mock_client() -> MockWorkloadClient {
        let mut mock = MockWorkloadClient::new();
        mock.expect_kind().return_const(WorkloadKind::Deployment);
        mock
    }

    mod codec {
        use super::*;

        #[test]
        fn test_encode_is_decimal() {
            assert_eq!(encode_replicas(0), "0");
            assert_eq!(encode_replicas(3), "3");
            assert_eq!(encode_replicas(i32::MAX), "2147483647");
        }

        #[test]
        fn test_decode_inverts_encode() {
            for n in [0, 1, 3, 17, 250, i32::MAX] {
                assert_eq!(decode_replicas(Some(&encode_replicas(n))), Some(n));
            }
        }

        #[test]
        fn test_decode_absent_is_none() {
            assert_eq!(decode_replicas(None), None);
        }

        #[test]
        fn test_decode_rejects_garbage() {
            assert_eq!(decode_replicas(Some("")), None);
            assert_eq!(decode_replicas(Some("three")), None);
            assert_eq!(decode_replicas(Some("3.5")), None);
            assert_eq!(decode_replicas(Some(" 3")), None);
            assert_eq!(decode_replicas(Some("2147483648")), None);
        }

        #[test]
        fn test_decode_rejects_negative() {
            assert_eq!(decode_replicas(Some("-1")), None);
        }

        #[test]
        fn test_decode_from_annotations_uses_reserved_key() {
            let map = annotations(&[
                ("deployment.kubernetes.io/revision", "7"),
                (DESIRED_REPLICAS_ANNOTATION, "5"),
            ]);
            assert_eq!(decode_from_annotations(&map), Some(5));
            assert_eq!(decode_from_annotations(&BTreeMap::new()), None);
        }

        #[test]
        fn test_patch_only_sets_checkpoint() {
            let patch = checkpoint_patch(3);
            assert_eq!(
                patch,
                serde_json::json!({
                    "metadata": {
                        "annotations": {
                            "k8s.dev.scaler/desired.replicas": "3"
                        }
                    }
                })
            );
        }
    }

    mod store {
        use super::*;

        #[tokio::test]
        async fn test_down_records_current_replicas_and_targets_zero() {
            let mut mock = mock_client();
            mock.expect_patch_annotations()
                .with(eq("d1"), eq(checkpoint_patch(3)))
                .times(1)
                .returning(|_, _| Ok(()));

            let store = CheckpointStore::new(&mock);
            let target = store
                .resolve_target_replicas(&deployment("d1", 3), ScaleDirection::Down)
                .await
                .unwrap();
            assert_eq!(target, 0);
        }

        #[tokio::test]
        async fn test_down_fails_when_checkpoint_cannot_be_written() {
            let mut mock = mock_client();
            mock.expect_patch_annotations()
                .returning(|_, _| Err(conflict()));

            let store = CheckpointStore::new(&mock);
            let result = store
                .resolve_target_replicas(&deployment("d1", 3), ScaleDirection::Down)
                .await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_down_never_reads_annotations() {
            let mut mock = mock_client();
            mock.expect_patch_annotations().returning(|_, _| Ok(()));
            mock.expect_get_annotations().never();

            let store = CheckpointStore::new(&mock);
            store
                .resolve_target_replicas(&deployment("d1", 2), ScaleDirection::Down)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_up_restores_recorded_count() {
            let mut mock = mock_client();
            mock.expect_get_annotations()
                .with(eq("d1"))
                .returning(|_| Ok(annotations(&[(DESIRED_REPLICAS_ANNOTATION, "3")])));
            mock.expect_patch_annotations().never();

            let store = CheckpointStore::new(&mock);
            let target = store
                .resolve_target_replicas(&deployment("d1", 0), ScaleDirection::Up)
                .await
                .unwrap();
            assert_eq!(target, 3);
        }

        #[tokio::test]
        async fn test_up_reads_server_state_not_snapshot() {
            let mut mock = mock_client();
            mock.expect_get_annotations()
                .returning(|_| Ok(annotations(&[(DESIRED_REPLICAS_ANNOTATION, "4")])));

            // The listing snapshot still carries an older checkpoint.
            let stale = deployment("d1", 0).with_annotation(DESIRED_REPLICAS_ANNOTATION, "9");
            let store = CheckpointStore::new(&mock);
            let target = store
                .resolve_target_replicas(&stale, ScaleDirection::Up)
                .await
                .unwrap();
            assert_eq!(target, 4);
        }

        #[tokio::test]
        async fn test_up_without_checkpoint_targets_zero() {
            let mut mock = mock_client();
            mock.expect_get_annotations()
                .returning(|_| Ok(annotations(&[("team", "payments")])));

            let store = CheckpointStore::new(&mock);
            let target = store
                .resolve_target_replicas(&deployment("d1", 0), ScaleDirection::Up)
                .await
                .unwrap();
            assert_eq!(target, 0);
        }

        #[tokio::test]
        async fn test_up_with_malformed_checkpoint_targets_zero() {
            let mut mock = mock_client();
            mock.expect_get_annotations()
                .returning(|_| Ok(annotations(&[(DESIRED_REPLICAS_ANNOTATION, "lots")])));

            let store = CheckpointStore::new(&mock);
            let target = store
                .resolve_target_replicas(&deployment("d1", 0), ScaleDirection::Up)
                .await
                .unwrap();
            assert_eq!(target, 0);
        }

        #[tokio::test]
        async fn test_up_propagates_read_errors() {
            let mut mock = mock_client();
            mock.expect_get_annotations().returning(|_| Err(conflict()));

            let store = CheckpointStore::new(&mock);
            assert!(store.read_checkpoint("d1").await.is_err());
        }
    }
}
