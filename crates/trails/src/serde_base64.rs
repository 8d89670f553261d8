use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Serde helpers for `Option<Vec<u8>>`, stored as a base64 string so opaque
/// bytes survive JSON.
/// 將選用的位元組資料以 base64 字串寫入 JSON。
pub mod option {
    use super::*;
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => BASE64
                .decode(text.as_bytes())
                .map(Some)
                .map_err(|err| D::Error::custom(format!("invalid base64 snapshot: {err}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(default, with = "super::option")]
        maybe: Option<Vec<u8>>,
    }

    #[test]
    fn binary_payload_is_stored_as_text() {
        let holder = Holder {
            maybe: Some(vec![0, 159, 146, 150, 255]),
        };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(json, r#"{"maybe":"AJ+Slv8="}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, holder);
    }

    #[test]
    fn missing_and_null_are_none() {
        let missing: Holder = serde_json::from_str("{}").unwrap();
        let null: Holder = serde_json::from_str(r#"{"maybe":null}"#).unwrap();
        assert!(missing.maybe.is_none());
        assert!(null.maybe.is_none());
    }

    #[test]
    fn rejects_corrupt_payload() {
        let err = serde_json::from_str::<Holder>(r#"{"maybe":"@@@"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid base64 snapshot"));
    }
}
