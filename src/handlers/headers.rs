//! Request header contract
//!
//! Every request carries an `Api` header naming the protocol version, and a
//! `User-Agent`. Authenticated requests add `Authorization`, and instance
//! scoped requests add `Instance`.

use warp::http::header::{AUTHORIZATION, USER_AGENT};
use warp::http::HeaderMap;

use crate::auth::provider::BasicCredentials;
use crate::auth::token::extract_bearer_token;
use crate::constants::{API_HEADER, API_PRODUCT, API_VERSION, INSTANCE_HEADER};
use crate::error::{HostError, Result};

/// A `Product/Version` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductHeader {
    pub name: String,
    pub version: String,
}

impl ProductHeader {
    /// Parses `Product/Version`. Values with whitespace or comments do not conform.
    pub fn parse(value: &str) -> Option<Self> {
        if value.chars().any(char::is_whitespace) {
            return None;
        }
        let (name, version) = value.split_once('/')?;
        if name.is_empty() || version.is_empty() || version.contains('/') {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Credentials presented by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Bearer(String),
    Basic(BasicCredentials),
}

#[derive(Debug, Clone)]
pub struct ApiHeaders {
    pub api_version: (u64, u64, u64),
    pub raw_user_agent: String,
    /// Set only when the user agent is a conformant product header
    pub user_agent: Option<ProductHeader>,
    pub authorization: Option<Authorization>,
    pub instance_id: Option<i64>,
}

impl ApiHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let api = header_str(headers, API_HEADER)?
            .ok_or_else(|| validation("Missing Api header!"))?;
        let api_version = parse_api_version(api)?;

        let raw_user_agent = header_str(headers, USER_AGENT.as_str())?
            .ok_or_else(|| validation("Missing User-Agent header!"))?
            .trim()
            .to_string();
        if raw_user_agent.is_empty() {
            return Err(validation("User-Agent header is empty!"));
        }
        let user_agent = ProductHeader::parse(&raw_user_agent);

        let authorization = match header_str(headers, AUTHORIZATION.as_str())? {
            Some(value) => Some(parse_authorization(value)?),
            None => None,
        };

        let instance_id = match header_str(headers, INSTANCE_HEADER)? {
            Some(value) => Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| validation("Invalid Instance header!"))?,
            ),
            None => None,
        };

        Ok(Self {
            api_version,
            raw_user_agent,
            user_agent,
            authorization,
            instance_id,
        })
    }

    pub fn bearer(&self) -> Option<&str> {
        match &self.authorization {
            Some(Authorization::Bearer(token)) => Some(token),
            _ => None,
        }
    }

    pub fn basic(&self) -> Option<&BasicCredentials> {
        match &self.authorization {
            Some(Authorization::Basic(credentials)) => Some(credentials),
            _ => None,
        }
    }
}

/// The `Api` header value this server sends and expects
pub fn api_header_value() -> String {
    let (major, minor, patch) = API_VERSION;
    format!("{}/{}.{}.{}", API_PRODUCT, major, minor, patch)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| validation(&format!("Header {} is not valid ASCII!", name))),
        None => Ok(None),
    }
}

fn parse_api_version(value: &str) -> Result<(u64, u64, u64)> {
    let product = ProductHeader::parse(value.trim())
        .filter(|product| product.name == API_PRODUCT)
        .ok_or_else(|| validation("Invalid Api header!"))?;

    let mut parts = product.version.split('.').map(str::parse::<u64>);
    let mut next = || parts.next().transpose().map_err(|_| validation("Invalid Api version!"));
    let major = next()?.ok_or_else(|| validation("Invalid Api version!"))?;
    let minor = next()?.unwrap_or(0);
    let patch = next()?.unwrap_or(0);

    if major != API_VERSION.0 {
        return Err(validation(&format!(
            "Incompatible Api version {}! This server speaks {}",
            product.version,
            api_header_value()
        )));
    }
    Ok((major, minor, patch))
}

fn parse_authorization(value: &str) -> Result<Authorization> {
    if let Some(token) = extract_bearer_token(value) {
        return Ok(Authorization::Bearer(token.to_string()));
    }
    BasicCredentials::from_header(value)
        .map(Authorization::Basic)
        .ok_or(HostError::Unauthorized)
}

fn validation(message: &str) -> HostError {
    HostError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use warp::http::HeaderValue;

    fn headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("api", HeaderValue::from_static("RustyFleet.Api/1.2.3"));
        headers.insert("authorization", HeaderValue::from_static("Bearer asdfasdf"));
        headers.insert("user-agent", HeaderValue::from_str(user_agent).unwrap());
        headers
    }

    #[test]
    fn test_user_agents_are_valid() {
        let browser = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/51.0.2704.103 Safari/537.36.";
        let parsed = ApiHeaders::from_headers(&headers(browser)).unwrap();
        assert_eq!(parsed.raw_user_agent, browser);
        assert!(parsed.user_agent.is_none());

        let conformant = "FleetClient/3.2.1.4";
        let parsed = ApiHeaders::from_headers(&headers(conformant)).unwrap();
        assert_eq!(parsed.raw_user_agent, conformant);
        assert_eq!(
            parsed.user_agent,
            Some(ProductHeader {
                name: "FleetClient".to_string(),
                version: "3.2.1.4".to_string(),
            })
        );

        assert!(matches!(
            ApiHeaders::from_headers(&headers("")),
            Err(HostError::ValidationError(_))
        ));
    }

    #[test]
    fn test_api_version_major_must_match() {
        let parsed = ApiHeaders::from_headers(&headers("Client/1.0")).unwrap();
        assert_eq!(parsed.api_version, (1, 2, 3));
        assert_eq!(parsed.bearer(), Some("asdfasdf"));

        let mut wrong_major = headers("Client/1.0");
        wrong_major.insert("api", HeaderValue::from_static("RustyFleet.Api/2.0.0"));
        assert!(ApiHeaders::from_headers(&wrong_major).is_err());

        let mut wrong_product = headers("Client/1.0");
        wrong_product.insert("api", HeaderValue::from_static("Other.Api/1.0.0"));
        assert!(ApiHeaders::from_headers(&wrong_product).is_err());

        let mut missing = headers("Client/1.0");
        missing.remove("api");
        assert!(ApiHeaders::from_headers(&missing).is_err());
    }

    #[test]
    fn test_basic_and_instance_headers() {
        let mut map = headers("Client/1.0");
        let basic = format!("Basic {}", STANDARD.encode("Admin:secret"));
        map.insert("authorization", HeaderValue::from_str(&basic).unwrap());
        map.insert("instance", HeaderValue::from_static("12"));

        let parsed = ApiHeaders::from_headers(&map).unwrap();
        assert_eq!(parsed.basic().map(|c| c.username.as_str()), Some("Admin"));
        assert!(parsed.bearer().is_none());
        assert_eq!(parsed.instance_id, Some(12));

        map.insert("instance", HeaderValue::from_static("twelve"));
        assert!(matches!(
            ApiHeaders::from_headers(&map),
            Err(HostError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unknown_authorization_scheme_is_unauthorized() {
        let mut map = headers("Client/1.0");
        map.insert("authorization", HeaderValue::from_static("Digest abc"));
        assert!(matches!(ApiHeaders::from_headers(&map), Err(HostError::Unauthorized)));
    }
}
