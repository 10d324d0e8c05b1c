use crate::{
    database,
    models::{DeviceRecord, ImageRecord},
};
use anyhow::{Context, Result, anyhow};
use log::debug;
#[cfg(feature = "mock")]
use mockall::automock;
use mongodb::{Collection, Database, bson::doc};
use trait_variant::make;

/// Persistence of device records
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait DeviceStore {
    /// The most recently created record, regardless of device.
    async fn latest(&self) -> Result<Option<DeviceRecord>>;
    /// The first record stored for `device_id`.
    async fn find_by_device_id(&self, device_id: &str) -> Result<Option<DeviceRecord>>;
    /// Insert a new record and return it with its assigned id.
    async fn insert(&self, record: DeviceRecord) -> Result<DeviceRecord>;
    /// Overwrite an existing record identified by its id.
    async fn replace(&self, record: DeviceRecord) -> Result<DeviceRecord>;
    async fn ping(&self) -> Result<()>;
}

/// Persistence of uploaded images
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait ImageStore {
    async fn insert(&self, image: ImageRecord) -> Result<ImageRecord>;
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoDeviceStore {
    database: Database,
    devices: Collection<DeviceRecord>,
}

impl MongoDeviceStore {
    pub fn new(database: &Database, collection: &str) -> Self {
        Self {
            database: database.clone(),
            devices: database.collection(collection),
        }
    }
}

impl DeviceStore for MongoDeviceStore {
    async fn latest(&self) -> Result<Option<DeviceRecord>> {
        self.devices
            .find_one(doc! {})
            .sort(doc! { "timestamp": -1 })
            .await
            .context("failed to query latest device")
    }

    async fn find_by_device_id(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        debug!("find device {device_id}");

        self.devices
            .find_one(doc! { "deviceId": device_id })
            .await
            .with_context(|| format!("failed to query device {device_id}"))
    }

    async fn insert(&self, mut record: DeviceRecord) -> Result<DeviceRecord> {
        let result = self
            .devices
            .insert_one(&record)
            .await
            .context("failed to insert device")?;

        record.id = result.inserted_id.as_object_id();
        Ok(record)
    }

    async fn replace(&self, record: DeviceRecord) -> Result<DeviceRecord> {
        let id = record
            .id
            .ok_or_else(|| anyhow!("failed to replace device: record has no id"))?;

        let result = self
            .devices
            .replace_one(doc! { "_id": id }, &record)
            .await
            .context("failed to replace device")?;

        anyhow::ensure!(
            result.matched_count == 1,
            "failed to replace device: record {id} no longer exists"
        );

        Ok(record)
    }

    async fn ping(&self) -> Result<()> {
        database::ping(&self.database).await
    }
}

#[derive(Clone)]
pub struct MongoImageStore {
    database: Database,
    images: Collection<ImageRecord>,
}

impl MongoImageStore {
    pub fn new(database: &Database, collection: &str) -> Self {
        Self {
            database: database.clone(),
            images: database.collection(collection),
        }
    }
}

impl ImageStore for MongoImageStore {
    async fn insert(&self, mut image: ImageRecord) -> Result<ImageRecord> {
        let result = self
            .images
            .insert_one(&image)
            .await
            .context("failed to insert image")?;

        image.id = result.inserted_id.as_object_id();
        Ok(image)
    }

    async fn ping(&self) -> Result<()> {
        database::ping(&self.database).await
    }
}
