//! Device registry service
//!
//! Implements the device lifecycle (registration, boot reports, face
//! enrollment and verification) on top of a [`DeviceStore`].
//!
//! Updates are read-modify-write cycles without locking; two concurrent
//! requests for the same device may lose one of the updates.

use crate::{
    models::{
        BootCount, BootReport, DeviceRecord, DeviceStatus, EnrollmentProgress, FaceSampleSubmission,
        HealthStatus, RegisterDevice, Verification, VerifyDevice,
    },
    store::DeviceStore,
};
use anyhow::{Context, Result, anyhow, ensure};
use base64::{Engine, prelude::BASE64_STANDARD};
use log::{debug, info, warn};
use serde_valid::Validate;

/// Service for device lifecycle operations
pub struct RegistryService;

impl RegistryService {
    /// Status flags of the most recently created device record
    ///
    /// The lookup ignores the requesting device; see DESIGN.md.
    pub async fn status<S: DeviceStore>(store: &S) -> Result<DeviceStatus> {
        let latest = store.latest().await?;
        Ok(latest.as_ref().map(DeviceStatus::from).unwrap_or_default())
    }

    /// Boot counter of the most recently created device record
    pub async fn boot_count<S: DeviceStore>(store: &S) -> Result<BootCount> {
        let boot_count = store
            .latest()
            .await?
            .map(|record| record.boot_count)
            .unwrap_or(0);

        Ok(BootCount { boot_count })
    }

    /// Create a registered device record. Existing records with the same
    /// device id are left untouched.
    pub async fn register<S: DeviceStore>(
        store: &S,
        registration: RegisterDevice,
    ) -> Result<DeviceRecord> {
        registration
            .validate()
            .context("failed to validate registration")?;

        let record = store.insert(DeviceRecord::registered(registration)).await?;
        info!("registered device {}", record.device_id);

        Ok(record)
    }

    /// Count a boot of `report.device_id`, creating a telemetry-only record
    /// for devices seen for the first time.
    pub async fn report_boot<S: DeviceStore>(store: &S, report: BootReport) -> Result<DeviceRecord> {
        report.validate().context("failed to validate boot report")?;

        match store.find_by_device_id(&report.device_id).await? {
            None => {
                info!("first boot report of unknown device {}", report.device_id);
                store
                    .insert(DeviceRecord::telemetry_only(report.device_id))
                    .await
            }
            Some(mut record) => {
                record.record_boot();
                debug!(
                    "device {} boot count {}",
                    record.device_id, record.boot_count
                );
                store.replace(record).await
            }
        }
    }

    /// Append a face sample to an existing device
    pub async fn submit_face_sample<S: DeviceStore>(
        store: &S,
        submission: FaceSampleSubmission,
    ) -> Result<EnrollmentProgress> {
        submission
            .validate()
            .context("failed to validate face sample")?;

        let Some(mut record) = store.find_by_device_id(&submission.device_id).await? else {
            warn!("face sample for unknown device {}", submission.device_id);
            return Err(anyhow!("device not found"));
        };

        let data = BASE64_STANDARD
            .decode(submission.face_data.as_bytes())
            .context("failed to decode face data from base64")?;

        let was_enrolled = record.is_enrolled();
        let progress = record.add_face_sample(submission.sample_id, data);
        store.replace(record).await?;

        if progress.enrollment_complete && !was_enrolled {
            info!("device {} enrollment complete", submission.device_id);
        }

        Ok(progress)
    }

    /// Succeeds only for devices whose face enrollment is complete
    pub async fn verify<S: DeviceStore>(store: &S, request: VerifyDevice) -> Result<Verification> {
        request
            .validate()
            .context("failed to validate verification request")?;

        let enrolled = store
            .find_by_device_id(&request.device_id)
            .await?
            .is_some_and(|record| record.is_enrolled());

        ensure!(enrolled, "device not found or enrollment incomplete");

        Ok(Verification { verified: true })
    }

    /// Whether the document store is reachable
    pub async fn health<S: DeviceStore>(store: &S) -> HealthStatus {
        let mongo_connected = match store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("healthcheck ping failed: {e:#}");
                false
            }
        };

        HealthStatus { mongo_connected }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::models::{ENROLLMENT_SAMPLE_COUNT, FaceData};
    use mockall_double::double;
    use mongodb::bson::oid::ObjectId;

    #[double]
    use crate::store::DeviceStore;

    fn stored(mut record: DeviceRecord) -> DeviceRecord {
        record.id = Some(ObjectId::new());
        record
    }

    fn submission(device_id: &str, sample_id: i64, face_data: &str) -> FaceSampleSubmission {
        FaceSampleSubmission {
            device_id: device_id.to_string(),
            sample_id,
            face_data: face_data.to_string(),
        }
    }

    mod status {
        use super::*;

        #[tokio::test]
        async fn defaults_without_devices() {
            let mut store = DeviceStore::default();
            store
                .expect_latest()
                .returning(|| Box::pin(async { Ok(None) }));

            let status = RegistryService::status(&store).await.expect("should succeed");

            assert_eq!(status, DeviceStatus::default());
        }

        #[tokio::test]
        async fn store_failure_is_propagated() {
            let mut store = DeviceStore::default();
            store
                .expect_latest()
                .returning(|| Box::pin(async { Err(anyhow!("connection reset")) }));

            assert!(RegistryService::status(&store).await.is_err());
            assert!(RegistryService::boot_count(&store).await.is_err());
        }
    }

    mod report_boot {
        use super::*;

        #[tokio::test]
        async fn unknown_device_is_inserted_with_first_boot_defaults() {
            let mut store = DeviceStore::default();
            store
                .expect_find_by_device_id()
                .returning(|_| Box::pin(async { Ok(None) }));
            store
                .expect_insert()
                .withf(|record| record.device_id == "esp32-01" && record.boot_count == 1)
                .times(1)
                .returning(|record| Box::pin(async move { Ok(stored(record)) }));
            store.expect_replace().never();

            let record = RegistryService::report_boot(
                &store,
                BootReport {
                    device_id: "esp32-01".to_string(),
                },
            )
            .await
            .expect("should succeed");

            assert!(record.first_boot);
            assert!(record.id.is_some());
        }

        #[tokio::test]
        async fn known_device_is_incremented() {
            let mut store = DeviceStore::default();
            store.expect_find_by_device_id().returning(|device_id| {
                let record = stored(DeviceRecord::telemetry_only(device_id));
                Box::pin(async move { Ok(Some(record)) })
            });
            store
                .expect_replace()
                .times(1)
                .returning(|record| Box::pin(async move { Ok(record) }));
            store.expect_insert().never();

            let record = RegistryService::report_boot(
                &store,
                BootReport {
                    device_id: "esp32-01".to_string(),
                },
            )
            .await
            .expect("should succeed");

            assert_eq!(record.boot_count, 2);
            assert!(!record.first_boot);
        }

        #[tokio::test]
        async fn empty_device_id_is_rejected() {
            let store = DeviceStore::default();

            let result = RegistryService::report_boot(
                &store,
                BootReport {
                    device_id: String::new(),
                },
            )
            .await;

            assert!(result.is_err());
        }
    }

    mod face_samples {
        use super::*;

        #[tokio::test]
        async fn unknown_device_fails_without_writing() {
            let mut store = DeviceStore::default();
            store
                .expect_find_by_device_id()
                .returning(|_| Box::pin(async { Ok(None) }));
            store.expect_insert().never();
            store.expect_replace().never();

            let result =
                RegistryService::submit_face_sample(&store, submission("ghost", 1, "AAEC")).await;

            assert_eq!(result.unwrap_err().to_string(), "device not found");
        }

        #[tokio::test]
        async fn invalid_base64_fails_without_writing() {
            let mut store = DeviceStore::default();
            store.expect_find_by_device_id().returning(|device_id| {
                let record = stored(DeviceRecord::telemetry_only(device_id));
                Box::pin(async move { Ok(Some(record)) })
            });
            store.expect_replace().never();

            let result =
                RegistryService::submit_face_sample(&store, submission("esp32-01", 1, "***")).await;

            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("failed to decode face data")
            );
        }

        #[tokio::test]
        async fn fifth_sample_completes_enrollment() {
            let mut store = DeviceStore::default();
            store.expect_find_by_device_id().returning(|device_id| {
                let mut record = stored(DeviceRecord::telemetry_only(device_id));
                for sample_id in 1..ENROLLMENT_SAMPLE_COUNT as i64 {
                    record.add_face_sample(sample_id, vec![0]);
                }
                Box::pin(async move { Ok(Some(record)) })
            });
            store
                .expect_replace()
                .withf(|record| {
                    record.face_data.enrolled && record.face_data.samples[4].data.bytes == [0, 1, 2]
                })
                .times(1)
                .returning(|record| Box::pin(async move { Ok(record) }));

            let progress =
                RegistryService::submit_face_sample(&store, submission("esp32-01", 5, "AAEC"))
                    .await
                    .expect("should succeed");

            assert_eq!(
                progress,
                EnrollmentProgress {
                    samples_collected: 5,
                    enrollment_complete: true,
                }
            );
        }
    }

    mod failed_writes {
        use super::*;

        fn failing_store() -> DeviceStore {
            let mut store = DeviceStore::default();
            store.expect_find_by_device_id().returning(|device_id| {
                let record = stored(DeviceRecord::telemetry_only(device_id));
                Box::pin(async move { Ok(Some(record)) })
            });
            store
                .expect_insert()
                .returning(|_| Box::pin(async { Err(anyhow!("write concern error")) }));
            store
                .expect_replace()
                .returning(|_| Box::pin(async { Err(anyhow!("write concern error")) }));
            store
        }

        #[tokio::test]
        async fn register_propagates_insert_error() {
            let result = RegistryService::register(
                &failing_store(),
                RegisterDevice {
                    device_id: "esp32-01".to_string(),
                    owner_name: "Ada".to_string(),
                    password: "secret".to_string(),
                    location: "Lab".to_string(),
                },
            )
            .await;

            assert_eq!(result.unwrap_err().to_string(), "write concern error");
        }

        #[tokio::test]
        async fn boot_report_propagates_replace_error() {
            let result = RegistryService::report_boot(
                &failing_store(),
                BootReport {
                    device_id: "esp32-01".to_string(),
                },
            )
            .await;

            assert_eq!(result.unwrap_err().to_string(), "write concern error");
        }

        #[tokio::test]
        async fn face_sample_propagates_replace_error() {
            let result = RegistryService::submit_face_sample(
                &failing_store(),
                submission("esp32-01", 1, "AAEC"),
            )
            .await;

            assert_eq!(result.unwrap_err().to_string(), "write concern error");
        }
    }

    mod verify {
        use super::*;

        fn store_with(record: Option<DeviceRecord>) -> DeviceStore {
            let mut store = DeviceStore::default();
            store.expect_find_by_device_id().returning(move |_| {
                let record = record.clone();
                Box::pin(async move { Ok(record) })
            });
            store
        }

        fn request() -> VerifyDevice {
            VerifyDevice {
                device_id: "esp32-01".to_string(),
            }
        }

        #[tokio::test]
        async fn unknown_device_fails() {
            let result = RegistryService::verify(&store_with(None), request()).await;

            assert_eq!(
                result.unwrap_err().to_string(),
                "device not found or enrollment incomplete"
            );
        }

        #[tokio::test]
        async fn incomplete_enrollment_fails() {
            let record = DeviceRecord::telemetry_only("esp32-01");

            assert!(
                RegistryService::verify(&store_with(Some(record)), request())
                    .await
                    .is_err()
            );
        }

        #[tokio::test]
        async fn complete_enrollment_succeeds() {
            let mut record = DeviceRecord::telemetry_only("esp32-01");
            record.face_data = FaceData {
                enrolled: true,
                enrollment_complete: true,
                ..Default::default()
            };

            let verification = RegistryService::verify(&store_with(Some(record)), request())
                .await
                .expect("should succeed");

            assert!(verification.verified);
        }
    }

    #[tokio::test]
    async fn health_reports_ping_failure_as_disconnected() {
        let mut store = DeviceStore::default();
        store
            .expect_ping()
            .returning(|| Box::pin(async { Err(anyhow!("server selection timeout")) }));

        let health = RegistryService::health(&store).await;

        assert!(!health.mongo_connected);
    }
}
