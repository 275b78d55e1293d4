//! Integration tests driving repodeck through its public API

mod test_archive_deploy;
mod test_github;
mod test_interrupted_deploy;
mod test_profiles;
mod test_remote_deploy;
mod test_router;
