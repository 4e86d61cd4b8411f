use crate::server::response::ApiError;
use crate::store::paths::validate_name;

pub fn validate_namespace_name(name: &str) -> Result<(), ApiError> {
    validate_name(name).map_err(|msg| ApiError::bad_request(format!("Namespace {msg}")))
}

pub fn validate_repo_name(name: &str) -> Result<(), ApiError> {
    validate_name(name).map_err(|msg| ApiError::bad_request(format!("Repository {msg}")))
}

pub fn validate_folder_name(name: &str) -> Result<(), ApiError> {
    validate_name(name).map_err(|msg| ApiError::bad_request(format!("Folder {msg}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_prefix_in_message() {
        let err = validate_repo_name("../x").unwrap_err();
        assert!(err.message.starts_with("Repository"));
        assert!(validate_namespace_name("acme").is_ok());
        assert!(validate_folder_name("experiments").is_ok());
    }
}
