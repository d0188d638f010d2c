mod actions;
pub(crate) mod args;
mod keychain;

pub(crate) use actions::{handle_login, handle_logout, handle_register, handle_whoami};
#[cfg(test)]
pub(crate) use keychain::{clear_keyring_mock, lock_keyring_tests_sync};
pub(crate) use keychain::KeyringBackend;
