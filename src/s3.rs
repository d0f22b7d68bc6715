//! Utility functions for creating s3 clients and locating s3 objects
use crate::error::{Error, Result};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use regex::Regex;

pub const DEFAULT_REGION: &str = "us-west-2";

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct S3Object {
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    pub fn from_href(href: &str) -> Result<Self> {
        let re = Regex::new(r"^s3://(?<bucket>[^/]+)/(?<key>.+)$")
            .expect("Regex pattern should always compile");

        let captures = re.captures(href).ok_or_else(|| Error::S3 {
            href: href.to_string(),
            reason: "expected an href of the form s3://bucket/key".to_string(),
        })?;

        let (_, [bucket, key]) = captures.extract();

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

pub async fn client_from_profile(profile_name: &str, region: &str) -> Client {
    let base_config = aws_config::from_env()
        .profile_name(profile_name)
        .region(Region::new(region.to_string()))
        .load()
        .await;

    Client::new(&base_config)
}

pub async fn anon_client(region: &str) -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .no_credentials()
        .region(Region::new(region.to_string()))
        .load()
        .await;
    Client::new(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_object_from_href() {
        let href = "s3://bucket/GLCLU2000-2020/v2/2000/50N_090W.tif";
        let object = S3Object::from_href(href).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "bucket".to_string(),
                key: "GLCLU2000-2020/v2/2000/50N_090W.tif".to_string(),
            }
        );
    }

    #[test]
    fn test_s3_object_requires_key() {
        assert!(S3Object::from_href("s3://bucket").is_err());
        assert!(S3Object::from_href("s3://bucket/").is_err());
    }
}
