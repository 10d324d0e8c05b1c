//! Persisted documents and request/response payloads
//!
//! The device record is the only document with invariants: its state
//! transitions (registration, boot reports, face enrollment) are methods on
//! [`DeviceRecord`] so they can be exercised without a database.

use base64::{Engine, prelude::BASE64_STANDARD};
use mongodb::bson::{Binary, DateTime, oid::ObjectId, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Number of face samples after which a device counts as enrolled.
pub const ENROLLMENT_SAMPLE_COUNT: usize = 5;

/// Content type stored for uploads that don't declare one.
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/jpeg";

fn default_true() -> bool {
    true
}

fn binary(bytes: Vec<u8>) -> Binary {
    Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    }
}

fn empty_binary() -> Binary {
    binary(Vec::new())
}

fn format_timestamp(timestamp: DateTime) -> String {
    timestamp
        .try_to_rfc3339_string()
        .unwrap_or_else(|_| timestamp.timestamp_millis().to_string())
}

// ============================================================================
// Device documents
// ============================================================================

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<i64>,
    #[serde(default = "DateTime::now")]
    pub timestamp: DateTime,
    #[serde(default = "empty_binary")]
    pub data: Binary,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_id: Option<i32>,
    #[serde(default)]
    pub samples: Vec<FaceSample>,
    #[serde(default)]
    pub enrolled: bool,
    #[serde(default)]
    pub enrollment_complete: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default = "DateTime::now")]
    pub timestamp: DateTime,
    #[serde(default)]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default = "default_true")]
    pub first_boot: bool,
    #[serde(default)]
    pub is_registered: bool,
    #[serde(default)]
    pub boot_count: i64,
    #[serde(default)]
    pub face_data: FaceData,
}

/// Outcome of a face sample submission.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentProgress {
    pub samples_collected: usize,
    pub enrollment_complete: bool,
}

impl DeviceRecord {
    /// Record created by an explicit registration.
    pub fn registered(registration: RegisterDevice) -> Self {
        Self {
            id: None,
            timestamp: DateTime::now(),
            device_id: registration.device_id,
            owner_name: Some(registration.owner_name),
            password: Some(registration.password),
            location: Some(registration.location),
            first_boot: false,
            is_registered: true,
            boot_count: 0,
            face_data: FaceData {
                face_id: Some(1),
                ..Default::default()
            },
        }
    }

    /// Record created when an unknown device reports its first boot.
    pub fn telemetry_only(device_id: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: DateTime::now(),
            device_id: device_id.into(),
            owner_name: None,
            password: None,
            location: None,
            first_boot: true,
            is_registered: false,
            boot_count: 1,
            face_data: FaceData::default(),
        }
    }

    /// Apply a boot report to an existing record.
    pub fn record_boot(&mut self) {
        self.boot_count = self.boot_count.saturating_add(1);
        self.first_boot = false;
    }

    /// Append a face sample and flip the enrollment flags once enough
    /// samples were collected. The flags are never cleared.
    pub fn add_face_sample(&mut self, sample_id: i64, data: Vec<u8>) -> EnrollmentProgress {
        self.face_data.samples.push(FaceSample {
            sample_id: Some(sample_id),
            timestamp: DateTime::now(),
            data: binary(data),
        });

        if self.face_data.samples.len() >= ENROLLMENT_SAMPLE_COUNT {
            self.face_data.enrolled = true;
            self.face_data.enrollment_complete = true;
        }

        EnrollmentProgress {
            samples_collected: self.face_data.samples.len(),
            enrollment_complete: self.face_data.enrollment_complete,
        }
    }

    pub fn is_enrolled(&self) -> bool {
        self.face_data.enrollment_complete
    }
}

// ============================================================================
// Image documents
// ============================================================================

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub data: Binary,
    pub timestamp: DateTime,
    pub content_type: String,
}

impl ImageRecord {
    pub fn new(data: Vec<u8>, content_type: Option<&str>) -> Self {
        let content_type = content_type
            .map(str::trim)
            .filter(|content_type| !content_type.is_empty())
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE);

        Self {
            id: None,
            data: binary(data),
            timestamp: DateTime::now(),
            content_type: content_type.to_string(),
        }
    }
}

// ============================================================================
// Request payloads
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice {
    #[validate(min_length = 1)]
    pub device_id: String,
    #[validate(min_length = 1)]
    pub owner_name: String,
    #[validate(min_length = 1)]
    pub password: String,
    #[validate(min_length = 1)]
    pub location: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BootReport {
    #[validate(min_length = 1)]
    pub device_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FaceSampleSubmission {
    #[validate(min_length = 1)]
    pub device_id: String,
    pub sample_id: i64,
    #[validate(min_length = 1)]
    pub face_data: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyDevice {
    #[validate(min_length = 1)]
    pub device_id: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub first_boot: bool,
    pub is_registered: bool,
    pub face_enrolled: bool,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            first_boot: true,
            is_registered: false,
            face_enrolled: false,
        }
    }
}

impl From<&DeviceRecord> for DeviceStatus {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            first_boot: record.first_boot,
            is_registered: record.is_registered,
            face_enrolled: record.face_data.enrollment_complete,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootCount {
    pub boot_count: i64,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Verification {
    pub verified: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub mongo_connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceSampleView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<i64>,
    pub timestamp: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDataView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_id: Option<i32>,
    pub samples: Vec<FaceSampleView>,
    pub enrolled: bool,
    pub enrollment_complete: bool,
}

/// JSON view of a saved device record. The password is never echoed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecordView {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub timestamp: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub first_boot: bool,
    pub is_registered: bool,
    pub boot_count: i64,
    pub face_data: FaceDataView,
}

impl From<DeviceRecord> for DeviceRecordView {
    fn from(record: DeviceRecord) -> Self {
        let face_data = FaceDataView {
            face_id: record.face_data.face_id,
            samples: record
                .face_data
                .samples
                .into_iter()
                .map(|sample| FaceSampleView {
                    sample_id: sample.sample_id,
                    timestamp: format_timestamp(sample.timestamp),
                    data: BASE64_STANDARD.encode(sample.data.bytes),
                })
                .collect(),
            enrolled: record.face_data.enrolled,
            enrollment_complete: record.face_data.enrollment_complete,
        };

        Self {
            id: record.id.map(|id| id.to_hex()),
            timestamp: format_timestamp(record.timestamp),
            device_id: record.device_id,
            owner_name: record.owner_name,
            location: record.location,
            first_boot: record.first_boot,
            is_registered: record.is_registered,
            boot_count: record.boot_count,
            face_data,
        }
    }
}
