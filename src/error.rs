pub type GifResult<T> = Result<T, GifError>;

#[derive(thiserror::Error, Debug)]
pub enum GifError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("toolchain error: {0}")]
    Toolchain(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GifError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn toolchain(msg: impl Into<String>) -> Self {
        Self::Toolchain(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn subprocess(msg: impl Into<String>) -> Self {
        Self::Subprocess(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<image::ImageError> for GifError {
    fn from(err: image::ImageError) -> Self {
        Self::render(err.to_string())
    }
}

impl From<serde_json::Error> for GifError {
    fn from(err: serde_json::Error) -> Self {
        Self::serde(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            GifError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            GifError::toolchain("x")
                .to_string()
                .contains("toolchain error:")
        );
        assert!(GifError::render("x").to_string().contains("render error:"));
        assert!(
            GifError::subprocess("x")
                .to_string()
                .contains("subprocess error:")
        );
        assert!(
            GifError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = GifError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn json_errors_map_to_serde() {
        let err: GifError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, GifError::Serde(_)));
    }
}
