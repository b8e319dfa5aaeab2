use std::{fs, path::PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Uses `SECRET_KEY` when present, otherwise a key persisted next to the
/// manifest so tokens survive restarts in local setups.
pub(super) fn resolve_secret_key(explicit: Option<String>) -> String {
    if let Some(value) = explicit {
        return value;
    }

    let path = secret_file_path();
    if let Some(existing) = read_key(&path) {
        return existing;
    }

    let generated = generate_secret_key();
    if let Err(err) = persist_key(&path, &generated) {
        if err.kind() == std::io::ErrorKind::AlreadyExists {
            if let Some(existing) = read_key(&path) {
                return existing;
            }
        }
        tracing::warn!(
            error = %err,
            path = %path.display(),
            "Failed to persist generated secret key; tokens will not survive restart"
        );
    }

    generated
}

fn read_key(path: &PathBuf) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn persist_key(path: &PathBuf, key: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    std::io::Write::write_all(&mut file, key.as_bytes())
}

fn generate_secret_key() -> String {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn secret_file_path() -> PathBuf {
    std::env::var("EXAMS_SECRET_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".secret_key"))
}
