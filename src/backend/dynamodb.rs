//! DynamoDB backend.
//!
//! Table schema:
//! - `id` (S): partition key
//! - `data` (B): serialized session payload
//! - `expires` (N): unix timestamp after which the session is stale

use std::collections::HashMap;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue as DynamoValue, KeySchemaElement, KeyType,
    ProvisionedThroughput, ScalarAttributeType,
};

use super::{AttributeValue, Backend, Error, ID_ATTRIBUTE, Item, ScanPage, TableSpec};

/// A [`Backend`] over a DynamoDB client.
///
/// Timeouts and retries are whatever the client was configured with.
#[derive(Clone, Debug)]
pub struct DynamoDbBackend {
    client: Client,
}

impl DynamoDbBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn backend_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Backend(DisplayErrorContext(&err).to_string())
}

fn to_dynamo_item(item: Item) -> HashMap<String, DynamoValue> {
    item.into_iter()
        .map(|(name, value)| {
            let value = match value {
                AttributeValue::S(s) => DynamoValue::S(s),
                AttributeValue::N(n) => DynamoValue::N(n),
                AttributeValue::B(b) => DynamoValue::B(Blob::new(b)),
            };
            (name, value)
        })
        .collect()
}

// Attributes of other types are not part of a session record and are dropped.
fn from_dynamo_item(item: &HashMap<String, DynamoValue>) -> Item {
    item.iter()
        .filter_map(|(name, value)| {
            let value = match value {
                DynamoValue::S(s) => AttributeValue::S(s.clone()),
                DynamoValue::N(n) => AttributeValue::N(n.clone()),
                DynamoValue::B(b) => AttributeValue::B(b.as_ref().to_vec()),
                _ => return None,
            };
            Some((name.clone(), value))
        })
        .collect()
}

fn key(id: &str) -> DynamoValue {
    DynamoValue::S(id.to_string())
}

impl Backend for DynamoDbBackend {
    #[tracing::instrument(name = "ensuring session table exists", skip(self))]
    async fn create_table_if_absent(&self, spec: &TableSpec) -> Result<(), Error> {
        match self.client.describe_table().table_name(&spec.name).send().await {
            Ok(_) => return Ok(()),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if !missing {
                    return Err(backend_error(err));
                }
            }
        }

        tracing::info!(table = %spec.name, "session table not found, creating it");

        let attribute = AttributeDefinition::builder()
            .attribute_name(&spec.key_attribute)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(backend_error)?;
        let key_schema = KeySchemaElement::builder()
            .attribute_name(&spec.key_attribute)
            .key_type(KeyType::Hash)
            .build()
            .map_err(backend_error)?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(spec.read_capacity)
            .write_capacity_units(spec.write_capacity)
            .build()
            .map_err(backend_error)?;

        let created = self
            .client
            .create_table()
            .table_name(&spec.name)
            .attribute_definitions(attribute)
            .key_schema(key_schema)
            .provisioned_throughput(throughput)
            .send()
            .await;

        match created {
            Ok(_) => Ok(()),
            // another process created it between describe and create
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_resource_in_use_exception())
                    .unwrap_or(false) =>
            {
                Ok(())
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn get_item(&self, table: &str, id: &str) -> Result<Option<Item>, Error> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(ID_ATTRIBUTE, key(id))
            .consistent_read(true)
            .send()
            .await
            .map_err(backend_error)?;

        Ok(output.item().map(from_dynamo_item))
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), Error> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_dynamo_item(item)))
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn delete_item(&self, table: &str, id: &str) -> Result<(), Error> {
        self.client
            .delete_item()
            .table_name(table)
            .key(ID_ATTRIBUTE, key(id))
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn scan_page(
        &self,
        table: &str,
        exclusive_start_key: Option<Item>,
    ) -> Result<ScanPage, Error> {
        let output = self
            .client
            .scan()
            .table_name(table)
            .set_exclusive_start_key(exclusive_start_key.map(to_dynamo_item))
            .send()
            .await
            .map_err(backend_error)?;

        Ok(ScanPage {
            items: output.items().iter().map(from_dynamo_item).collect(),
            last_evaluated_key: output.last_evaluated_key().map(from_dynamo_item),
        })
    }
}
