use serde::{Deserialize, de::DeserializeOwned};

/// Envelope of every list endpoint. Paging fields are ignored.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub(crate) struct ListRecord<T> {
    pub data: Vec<T>,
}

pub(crate) fn decode_list<T: DeserializeOwned>(body: &str) -> serde_json::Result<Vec<T>> {
    let record: ListRecord<T> = serde_json::from_str(body)?;
    Ok(record.data)
}
