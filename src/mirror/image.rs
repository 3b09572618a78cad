// Image references as they appear in the IMAGE_TAGS list

use std::fmt;

/// A `name[:tag]` entry of the mirrored image list.
///
/// The entry is split on the first `:`; everything before it is the
/// repository name, everything after it is an opaque tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag {
    pub repository: String,
    pub tag: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageTagError {
    #[error("image tag list contains an empty entry")]
    Empty,
    #[error("image tag '{0}' has an empty repository name")]
    MissingRepository(String),
    #[error("image tag '{0}' has an empty tag after ':'")]
    EmptyTag(String),
}

impl ImageTag {
    pub fn parse(s: &str) -> Result<Self, ImageTagError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ImageTagError::Empty);
        }

        let (repository, tag) = match s.split_once(':') {
            Some((repository, tag)) => (repository, Some(tag)),
            None => (s, None),
        };

        if repository.is_empty() {
            return Err(ImageTagError::MissingRepository(s.to_string()));
        }
        if tag.is_some_and(str::is_empty) {
            return Err(ImageTagError::EmptyTag(s.to_string()));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.map(String::from),
        })
    }

    /// Reference used to pull the image from the source registry
    pub fn source_reference(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

/// ECR registry hostname for an account and region
///
/// # Example
/// With account_id = "123456789012" and region = "eu-west-1":
/// Returns "123456789012.dkr.ecr.eu-west-1.amazonaws.com"
pub fn registry_host(account_id: &str, region: &str) -> String {
    let domain = if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    };
    format!("{}.dkr.ecr.{}.{}", account_id, region, domain)
}

/// Fully-qualified reference an image is pushed to
pub fn destination_reference(account_id: &str, region: &str, image: &ImageTag) -> String {
    format!("{}/{}", registry_host(account_id, region), image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_colon() {
        let image = ImageTag::parse("library/nginx:1.25-alpine").unwrap();
        assert_eq!(image.repository, "library/nginx");
        assert_eq!(image.tag.as_deref(), Some("1.25-alpine"));

        // The tag is opaque, further colons belong to it
        let image = ImageTag::parse("busybox:odd:tag").unwrap();
        assert_eq!(image.repository, "busybox");
        assert_eq!(image.tag.as_deref(), Some("odd:tag"));
    }

    #[test]
    fn test_parse_without_tag() {
        let image = ImageTag::parse("alpine").unwrap();
        assert_eq!(image.repository, "alpine");
        assert_eq!(image.tag, None);
        assert_eq!(image.source_reference(), "alpine");
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert_eq!(ImageTag::parse("  "), Err(ImageTagError::Empty));
        assert_eq!(
            ImageTag::parse(":latest"),
            Err(ImageTagError::MissingRepository(":latest".to_string()))
        );
        assert_eq!(
            ImageTag::parse("nginx:"),
            Err(ImageTagError::EmptyTag("nginx:".to_string()))
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let image = ImageTag::parse(" redis:7 ").unwrap();
        assert_eq!(image.source_reference(), "redis:7");
    }

    #[test]
    fn test_destination_reference() {
        let image = ImageTag::parse("library/nginx:latest").unwrap();
        assert_eq!(
            destination_reference("123456789012", "us-east-1", &image),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/library/nginx:latest"
        );
    }

    #[test]
    fn test_registry_host_china_partition() {
        assert_eq!(
            registry_host("123456789012", "cn-north-1"),
            "123456789012.dkr.ecr.cn-north-1.amazonaws.com.cn"
        );
    }
}
