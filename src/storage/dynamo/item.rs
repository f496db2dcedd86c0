//! Conversions between error records and DynamoDB items.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::storage::schema::{
    self, ATTR_APPLICATION, ATTR_ERROR_BODY, ATTR_ERROR_ID, ATTR_HOST, ATTR_MESSAGE, ATTR_SOURCE,
    ATTR_STATUS_CODE, ATTR_TIME_UTC, ATTR_TYPE, ATTR_USER,
};
use crate::storage::{ContinuationKey, ErrorRecord, Result, StoreError};

type Item = HashMap<String, AttributeValue>;

/// Build the item written by `put_item`.
pub fn record_to_item(record: &ErrorRecord) -> Item {
    let mut item = HashMap::new();
    item.insert(ATTR_ERROR_ID.to_string(), AttributeValue::S(record.id.to_string()));
    item.insert(
        ATTR_APPLICATION.to_string(),
        AttributeValue::S(record.application_name.clone()),
    );
    item.insert(
        ATTR_TIME_UTC.to_string(),
        AttributeValue::S(schema::format_time_utc(&record.time_utc)),
    );
    item.insert(
        ATTR_STATUS_CODE.to_string(),
        AttributeValue::N(record.status_code.to_string()),
    );

    for (name, value) in [
        (ATTR_HOST, &record.host),
        (ATTR_TYPE, &record.type_name),
        (ATTR_SOURCE, &record.source),
        (ATTR_MESSAGE, &record.message),
        (ATTR_USER, &record.user),
        (ATTR_ERROR_BODY, &record.serialized_body),
    ] {
        if !value.is_empty() {
            item.insert(name.to_string(), AttributeValue::S(value.clone()));
        }
    }

    item
}

/// Read a record from a `get_item` or `query` item.
pub fn record_from_item(item: &Item) -> Result<ErrorRecord> {
    let id = schema::parse_error_id(required_string(item, ATTR_ERROR_ID)?)?;
    let time_utc = schema::parse_time_utc(required_string(item, ATTR_TIME_UTC)?)?;

    let status_code = match item.get(ATTR_STATUS_CODE) {
        Some(AttributeValue::N(n)) => n.parse().map_err(|e| {
            StoreError::InvalidRecord(format!("invalid {} '{}': {}", ATTR_STATUS_CODE, n, e))
        })?,
        Some(other) => {
            return Err(StoreError::InvalidRecord(format!(
                "{} is not a number: {:?}",
                ATTR_STATUS_CODE, other
            )))
        }
        None => 0,
    };

    Ok(ErrorRecord {
        id,
        application_name: required_string(item, ATTR_APPLICATION)?.to_string(),
        time_utc,
        host: optional_string(item, ATTR_HOST)?,
        type_name: optional_string(item, ATTR_TYPE)?,
        source: optional_string(item, ATTR_SOURCE)?,
        message: optional_string(item, ATTR_MESSAGE)?,
        user: optional_string(item, ATTR_USER)?,
        status_code,
        serialized_body: optional_string(item, ATTR_ERROR_BODY)?,
    })
}

/// Convert a continuation key into an `ExclusiveStartKey`.
pub fn key_to_item(key: &ContinuationKey) -> Item {
    key.iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value.to_string())))
        .collect()
}

/// Convert a `LastEvaluatedKey`. An empty key means the query is exhausted.
pub fn key_from_item(item: Item) -> Result<Option<ContinuationKey>> {
    if item.is_empty() {
        return Ok(None);
    }

    let mut attributes = Vec::with_capacity(item.len());
    for (name, value) in item {
        match value {
            AttributeValue::S(s) => attributes.push((name, s)),
            other => {
                return Err(StoreError::InvalidRecord(format!(
                    "unexpected key attribute {}: {:?}",
                    name, other
                )))
            }
        }
    }
    Ok(Some(ContinuationKey::new(attributes)))
}

fn required_string<'a>(item: &'a Item, name: &str) -> Result<&'a str> {
    match item.get(name) {
        Some(AttributeValue::S(s)) => Ok(s),
        Some(other) => Err(StoreError::InvalidRecord(format!(
            "{} is not a string: {:?}",
            name, other
        ))),
        None => Err(StoreError::InvalidRecord(format!("missing {}", name))),
    }
}

fn optional_string(item: &Item, name: &str) -> Result<String> {
    match item.get(name) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        Some(AttributeValue::Null(_)) | None => Ok(String::new()),
        Some(other) => Err(StoreError::InvalidRecord(format!(
            "{} is not a string: {:?}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::error_log::{CodecError, ErrorCodec, JsonErrorCodec};

    fn sample_record() -> ErrorRecord {
        ErrorRecord {
            id: Uuid::new_v4(),
            application_name: "sample".to_string(),
            time_utc: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            host: "web-1".to_string(),
            type_name: "System.InvalidOperationException".to_string(),
            source: "Orders".to_string(),
            message: "boom".to_string(),
            user: String::new(),
            status_code: 500,
            serialized_body: "{}".to_string(),
        }
    }

    #[test]
    fn test_record_to_item_layout() {
        let record = sample_record();
        let item = record_to_item(&record);

        assert_eq!(
            item.get("ErrorId"),
            Some(&AttributeValue::S(record.id.to_string()))
        );
        assert_eq!(
            item.get("Application"),
            Some(&AttributeValue::S("sample".to_string()))
        );
        assert_eq!(
            item.get("TimeUtc"),
            Some(&AttributeValue::S("2024-05-06T07:08:09.000000Z".to_string()))
        );
        assert_eq!(
            item.get("StatusCode"),
            Some(&AttributeValue::N("500".to_string()))
        );
        assert!(!item.contains_key("User"));
    }

    #[test]
    fn test_record_from_item_restores_fields() {
        let record = sample_record();
        let restored = record_from_item(&record_to_item(&record)).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_record_from_item_missing_key() {
        let mut item = record_to_item(&sample_record());
        item.remove("ErrorId");
        assert!(matches!(
            record_from_item(&item),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_record_from_item_wrong_type() {
        let mut item = record_to_item(&sample_record());
        item.insert("StatusCode".to_string(), AttributeValue::S("500".to_string()));
        assert!(matches!(
            record_from_item(&item),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_elmah_xml_item_has_no_decodable_body() {
        let mut item = record_to_item(&sample_record());
        item.remove("ErrorBody");
        item.insert(
            "AllXml".to_string(),
            AttributeValue::S("<error message=\"boom\" />".to_string()),
        );

        let record = record_from_item(&item).unwrap();
        assert_eq!(record.message, "boom");
        assert!(record.serialized_body.is_empty());
        assert!(matches!(
            JsonErrorCodec.decode(&record.serialized_body),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_continuation_key_conversion() {
        let key = ContinuationKey::new([
            ("ErrorId", "e7c1"),
            ("Application", "sample"),
            ("TimeUtc", "2024-05-06T07:08:09.000000Z"),
        ]);

        let restored = key_from_item(key_to_item(&key)).unwrap();
        assert_eq!(restored, Some(key));
        assert_eq!(key_from_item(HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_continuation_key_rejects_non_string() {
        let mut item = HashMap::new();
        item.insert("StatusCode".to_string(), AttributeValue::N("1".to_string()));
        assert!(key_from_item(item).is_err());
    }
}
