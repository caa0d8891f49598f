use std::{env, time::Duration};

/// Role names as stored in the `roles` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleNames {
    pub project_admin: String,
    pub annotator: String,
    pub annotation_approver: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            project_admin: "project_admin".to_string(),
            annotator: "annotator".to_string(),
            annotation_approver: "annotation_approver".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub roles: RoleNames,
    pub audio_fetch_timeout: Duration,
    pub audio_file_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/annotator.db?mode=rwc".to_string(),
            roles: RoleNames::default(),
            audio_fetch_timeout: Duration::from_secs(30),
            audio_file_extension: "wav".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            roles: RoleNames {
                project_admin: env::var("ROLE_PROJECT_ADMIN")
                    .unwrap_or(defaults.roles.project_admin),
                annotator: env::var("ROLE_ANNOTATOR").unwrap_or(defaults.roles.annotator),
                annotation_approver: env::var("ROLE_ANNOTATION_APPROVER")
                    .unwrap_or(defaults.roles.annotation_approver),
            },
            audio_fetch_timeout: env::var("AUDIO_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.audio_fetch_timeout),
            audio_file_extension: env::var("AUDIO_FILE_EXTENSION")
                .unwrap_or(defaults.audio_file_extension),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_role_names() {
        let config = Config::default();
        assert_eq!(config.roles.project_admin, "project_admin");
        assert_eq!(config.roles.annotator, "annotator");
        assert_eq!(config.roles.annotation_approver, "annotation_approver");
        assert_eq!(config.audio_fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.audio_file_extension, "wav");
    }
}
