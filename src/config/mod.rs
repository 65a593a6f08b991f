//! Configuration module for the deployment engine.
//!
//! This module handles all configuration-related functionality:
//! - Deep-merging operator overrides with control-plane defaults
//! - The on-disk layout of the tool's home directory
//! - Profiles, credentials and environment overrides

mod layout;
mod merge;
mod profile;

pub use layout::{
    CA_FILE, CERT_FILE, CLOUD_MODULE_DIR_NAME, HOME_DIR_NAME, HomeLayout, INSTANCE_ID_FILE,
    KEY_FILE,
};
pub use merge::{ConfigMerger, ConfigTree};
pub(crate) use merge::{CONFIG_FILE_MODE, set_mode};
pub use profile::{
    ADDR_ENV, Credentials, DEFAULT_ADDRESS, MODULE_URL_ENV, PROFILE_ENV, Profile, ProfileFile,
    ProfileStore, TOKEN_ENV, load_dotenv,
};
