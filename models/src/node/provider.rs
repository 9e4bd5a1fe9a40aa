//! Maps a Node's `spec.providerID` to the cloud instance backing it.
use crate::constants::AWS_PROVIDER_NAME;

use lazy_static::lazy_static;
use regex::Regex;
use snafu::{ensure, OptionExt, Snafu};

lazy_static! {
    // `<provider>://<provider specific id>`, e.g. `aws:///us-west-2a/i-0123456789abcdef0`.
    static ref PROVIDER_ID_RE: Regex =
        Regex::new(r"^(?P<ProviderName>\S+)://(?P<ProviderSpecificNodeID>\S+)")
            .expect("Invalid regex literal.");
    // `/<availability zone>/<instance id>`. The region is the zone without its trailing letter.
    static ref AWS_NODE_ID_RE: Regex =
        Regex::new(r"^/(?P<Region>[a-zA-Z0-9-]+)[a-z]/(?P<InstanceID>[a-zA-Z0-9-]+)$")
            .expect("Invalid regex literal.");
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderIdError {
    #[snafu(display("Malformed provider ID '{}'", provider_id))]
    Malformed { provider_id: String },

    #[snafu(display("Unsupported cloud provider '{}' in provider ID '{}'", provider, provider_id))]
    UnsupportedProvider {
        provider: String,
        provider_id: String,
    },
}

/// The EC2 instance a Node runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub region: String,
    pub instance_id: String,
}

/// Parses an AWS provider ID into the instance's region and ID.
pub fn parse_provider_id(provider_id: &str) -> Result<InstanceIdentity, ProviderIdError> {
    let captures = PROVIDER_ID_RE
        .captures(provider_id)
        .context(MalformedSnafu { provider_id })?;
    let provider = &captures["ProviderName"];
    ensure!(
        provider == AWS_PROVIDER_NAME,
        UnsupportedProviderSnafu {
            provider,
            provider_id
        }
    );

    let node_id = AWS_NODE_ID_RE
        .captures(&captures["ProviderSpecificNodeID"])
        .context(MalformedSnafu { provider_id })?;
    Ok(InstanceIdentity {
        region: node_id["Region"].to_string(),
        instance_id: node_id["InstanceID"].to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_aws_provider_id() {
        assert_eq!(
            parse_provider_id("aws:///us-west-2a/i-0123456789abcdef0").unwrap(),
            InstanceIdentity {
                region: "us-west-2".to_string(),
                instance_id: "i-0123456789abcdef0".to_string(),
            }
        );
        assert_eq!(
            parse_provider_id("aws:///eu-central-1b/i-0123")
                .unwrap()
                .region,
            "eu-central-1"
        );
    }

    #[test]
    fn test_parse_invalid_provider_ids() {
        assert!(matches!(
            parse_provider_id("gce://project/us-central1-a/instance-1"),
            Err(ProviderIdError::UnsupportedProvider { .. })
        ));
        for provider_id in &["", "i-0123", "aws://", "aws:///us-west-2/i-0123/extra"] {
            assert!(
                matches!(
                    parse_provider_id(provider_id),
                    Err(ProviderIdError::Malformed { .. })
                ),
                "{}",
                provider_id
            );
        }
    }
}
