use serde::Deserialize;

/// Envelope of list endpoints (`data` array plus cursor).
#[derive(Deserialize, Debug)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Envelope of single-object endpoints.
#[derive(Deserialize, Debug)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Deserialize, Debug)]
pub struct EntityResp {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct JobResp {
    pub id_str: String,
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ErrorResp {
    pub errors: Vec<ErrorItem>,
}

#[derive(Deserialize, Debug)]
pub struct ErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}
