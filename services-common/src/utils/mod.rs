use anyhow::bail;
use reqwest::Response;
use serde::de::DeserializeOwned;

pub mod keypair;
pub mod limiter;
pub mod poll;

/// Decodes type from json or return err with raw body info.
pub async fn decode_response_type_or_raw<T: DeserializeOwned>(
    response: Response,
) -> anyhow::Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(response) => Ok(response),
        Err(err) => {
            bail!(
                "failed to decode to json response: {err:?}, raw body: {:?}, status: {status}",
                String::from_utf8(bytes.to_vec())
            )
        }
    }
}
