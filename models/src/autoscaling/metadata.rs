//! Reads the instance identity from the EC2 instance metadata service (IMDSv2).
use crate::node::provider::InstanceIdentity;

use reqwest::Client;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254";

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: u32 = 60;
const IDENTITY_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

// The metadata service is link-local, so anything slower means it is not there.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetadataError {
    #[snafu(display("Unable to build HTTP client: '{}'", source))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("Unable to fetch IMDSv2 session token from '{}': '{}'", url, source))]
    SessionToken { url: String, source: reqwest::Error },

    #[snafu(display("Unable to fetch instance identity document from '{}': '{}'", url, source))]
    IdentityDocument { url: String, source: reqwest::Error },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    instance_id: String,
    region: String,
}

/// Client for the instance metadata service.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    client: Client,
    endpoint: String,
}

impl MetadataClient {
    pub fn new(endpoint: &str) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HttpClientSnafu)?;
        Ok(MetadataClient {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// The ID and region of the instance this process runs on.
    #[instrument(skip(self), err)]
    pub async fn instance_identity(&self) -> Result<InstanceIdentity, MetadataError> {
        let token_url = format!("{}{}", self.endpoint, TOKEN_PATH);
        let token = self
            .client
            .put(&token_url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .context(SessionTokenSnafu { url: &token_url })?
            .text()
            .await
            .context(SessionTokenSnafu { url: &token_url })?;

        let document_url = format!("{}{}", self.endpoint, IDENTITY_DOCUMENT_PATH);
        let document: IdentityDocument = self
            .client
            .get(&document_url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .context(IdentityDocumentSnafu { url: &document_url })?
            .json()
            .await
            .context(IdentityDocumentSnafu { url: &document_url })?;

        Ok(InstanceIdentity {
            region: document.region,
            instance_id: document.instance_id,
        })
    }
}
