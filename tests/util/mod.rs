use std::path::{Path, PathBuf};

use rxclaims::config::Settings;
use serde_json::{Value, json};
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.output()
            .lines()
            .filter(|l| l.contains(needle))
            .map(std::string::ToString::to_string)
            .collect()
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }

    pub fn unset(key: &str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::remove_var(key) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

/// A temporary data lake with the three input directories.
#[allow(dead_code)]
pub struct Lake {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Lake {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for sub in ["pharmacies", "claims", "reverts"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn pharmacy_dir(&self) -> PathBuf {
        self.root().join("pharmacies")
    }

    pub fn claims_dir(&self) -> PathBuf {
        self.root().join("claims")
    }

    pub fn reverts_dir(&self) -> PathBuf {
        self.root().join("reverts")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn write_pharmacies(&self, name: &str, rows: &[(&str, &str)]) {
        let mut body = String::from("npi,chain\n");
        for (npi, chain) in rows {
            body.push_str(&format!("{npi},{chain}\n"));
        }
        std::fs::write(self.pharmacy_dir().join(name), body).unwrap();
    }

    pub fn write_claims(&self, name: &str, rows: &Value) {
        std::fs::write(self.claims_dir().join(name), rows.to_string()).unwrap();
    }

    pub fn write_reverts(&self, name: &str, rows: &Value) {
        std::fs::write(self.reverts_dir().join(name), rows.to_string()).unwrap();
    }

    pub fn settings(&self) -> Settings {
        Settings {
            pharmacy_dir: self.pharmacy_dir(),
            claims_dir: self.claims_dir(),
            reverts_dir: self.reverts_dir(),
            output_dir: self.output_dir(),
            quantity_limit: None,
        }
    }

    /// Two chains, one drug, one revert and one claim for an unknown pharmacy.
    pub fn with_sample_data() -> Self {
        let lake = Self::new();
        lake.write_pharmacies(
            "pharmacies.csv",
            &[("0000000000", "health"), ("1111111111", "saint")],
        );
        lake.write_claims(
            "claims.json",
            &json!([
                claim("c1", "0000000000", "D1", 100.0, 2.0),
                claim("c2", "0000000000", "D1", 50.0, 5.0),
                claim("c3", "1111111111", "D1", 80.0, 2.0),
                claim("c4", "9999999999", "D1", 1.0, 1.0),
            ]),
        );
        lake.write_reverts(
            "reverts.json",
            &json!([{"id": "r1", "claim_id": "c1", "timestamp": "2024-01-03T09:00:00"}]),
        );
        lake
    }
}

#[allow(dead_code)]
pub fn claim(id: &str, npi: &str, ndc: &str, price: f64, quantity: f64) -> Value {
    json!({
        "id": id,
        "npi": npi,
        "ndc": ndc,
        "price": price,
        "quantity": quantity,
        "timestamp": "2024-01-02T10:00:00",
    })
}
