//! Validation against the published JSON schemas: the core STAC schema for
//! the document's `stac_version` plus every schema in `stac_extensions`.
use crate::error::{Error, Result};
use crate::extensions;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SCHEMAS_ROOT: &str = "https://schemas.stacspec.org";

/// Core schema of an item or collection document.
pub fn core_schema_uri(value: &Value) -> Result<String> {
    let version = value
        .get("stac_version")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("stac_version is missing".to_string()))?;
    let path = match value.get("type").and_then(Value::as_str) {
        Some("Feature") => "item-spec/json-schema/item.json",
        Some("Collection") => "collection-spec/json-schema/collection.json",
        other => {
            return Err(Error::Validation(format!(
                "no STAC schema for documents of type {other:?}"
            )))
        }
    };
    Ok(format!("{SCHEMAS_ROOT}/v{version}/{path}"))
}

fn schema_error(uri: &str, reason: impl ToString) -> Error {
    Error::Schema {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

/// Fetches and compiles schemas once, then checks any number of documents.
pub struct SchemaValidator {
    client: reqwest::Client,
    validators: HashMap<String, Arc<Validator>>,
}

impl SchemaValidator {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|source| Error::Http {
            href: SCHEMAS_ROOT.to_string(),
            source,
        })?;
        Ok(Self {
            client,
            validators: HashMap::new(),
        })
    }

    async fn validator(&mut self, uri: &str) -> Result<Arc<Validator>> {
        if let Some(validator) = self.validators.get(uri) {
            return Ok(validator.clone());
        }
        debug!(uri, "fetching schema");
        let http_error = |source| Error::Http {
            href: uri.to_string(),
            source,
        };
        let response = self.client.get(uri).send().await.map_err(http_error)?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                href: uri.to_string(),
                status: response.status().as_u16(),
            });
        }
        let body = response.bytes().await.map_err(http_error)?;
        let schema: Value = serde_json::from_slice(&body)?;

        // Remote $refs are resolved while compiling, with blocking requests
        let validator = tokio::task::spawn_blocking(move || {
            jsonschema::validator_for(&schema).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| schema_error(uri, e))?
        .map_err(|reason| schema_error(uri, reason))?;

        let validator = Arc::new(validator);
        self.validators.insert(uri.to_string(), validator.clone());
        Ok(validator)
    }

    /// Every schema violation of `value`, prefixed with the schema it breaks.
    pub async fn violations(&mut self, value: &Value) -> Result<Vec<String>> {
        let mut uris = vec![core_schema_uri(value)?];
        uris.extend(extensions::declared_extensions(value).into_iter().map(String::from));

        let mut violations = vec![];
        for uri in uris {
            let validator = self.validator(&uri).await?;
            let instance = value.clone();
            let errors = tokio::task::spawn_blocking(move || {
                validator
                    .iter_errors(&instance)
                    .map(|e| format!("{}: {e}", e.instance_path))
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| schema_error(&uri, e))?;
            violations.extend(errors.into_iter().map(|e| format!("{uri} {e}")));
        }
        Ok(violations)
    }

    pub async fn validate(&mut self, value: &Value) -> Result<()> {
        let violations = self.violations(value).await?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionBuilder, CollectionKind};
    use crate::geotiff;
    use crate::href_format::HrefFormat;
    use crate::identity::TileIdentity;
    use crate::item::build_item;
    use crate::media_type::MediaType;
    use crate::range_reader::MemoryRangeReader;
    use crate::testing;
    use serde_json::json;

    const HREF: &str = "https://storage.googleapis.com/earthenginepartners-hansen/\
                        GLCLU2000-2020/v2/2000/50N_090W.tif";

    async fn item() -> Value {
        let raster = testing::striped_geotiff(40, 40, -90.0, 50.0, 0.25, Some("255"));
        let reader = MemoryRangeReader::new(HREF, raster);
        let metadata = geotiff::read_metadata(&reader, 16_384).await.unwrap();
        let identity = TileIdentity::from_href(&HrefFormat::default(), HREF).unwrap();
        serde_json::to_value(build_item(HREF, &identity, &metadata).unwrap()).unwrap()
    }

    #[test]
    fn test_core_schema_uri() {
        assert_eq!(
            core_schema_uri(&json!({"type": "Feature", "stac_version": "1.0.0"})).unwrap(),
            "https://schemas.stacspec.org/v1.0.0/item-spec/json-schema/item.json"
        );
        assert_eq!(
            core_schema_uri(&json!({"type": "Collection", "stac_version": "1.1.0"})).unwrap(),
            "https://schemas.stacspec.org/v1.1.0/collection-spec/json-schema/collection.json"
        );
        assert!(core_schema_uri(&json!({"type": "Catalog", "stac_version": "1.0.0"})).is_err());
        assert!(core_schema_uri(&json!({"type": "Feature"})).is_err());
    }

    #[tokio::test]
    #[ignore = "fetches the published schemas"]
    async fn test_generated_documents_match_schemas() {
        let mut validator = SchemaValidator::new(None).unwrap();
        for kind in [CollectionKind::Annual, CollectionKind::Change] {
            let collection = CollectionBuilder::new(kind)
                .media_type(MediaType::Cog)
                .build()
                .await
                .unwrap();
            let value = serde_json::to_value(collection).unwrap();
            validator.validate(&value).await.unwrap();
        }
        validator.validate(&item().await).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "fetches the published schemas"]
    async fn test_schema_violations_are_reported() {
        let mut item = item().await;
        item["properties"]["proj:shape"] = json!(["40000", 40000]);
        item["assets"]["data"]["classification:classes"][0]["name"] = json!("not a slug!");
        item.as_object_mut().unwrap().remove("links");

        let mut validator = SchemaValidator::new(None).unwrap();
        let violations = validator.violations(&item).await.unwrap();
        assert!(violations.iter().any(|v| v.contains("item.json")), "{violations:?}");
        assert!(violations.iter().any(|v| v.contains(extensions::PROJECTION)), "{violations:?}");
        assert!(
            violations.iter().any(|v| v.contains(extensions::CLASSIFICATION)),
            "{violations:?}"
        );
    }
}
