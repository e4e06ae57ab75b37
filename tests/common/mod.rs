#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

pub const CUSTOMERS_CSV: &str = "customer_id,name\n1,Ann\n2,Bob\n3,Cy\n";
pub const ORDERS_CSV: &str =
    "order_id,customer_id,amount\n10,1,5.5\n11,1,7\n12,2,3\n13,4,1\n";
pub const STORES_CSV: &str = "store,city\nNorth,Oslo\nSouth,Bergen\n";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read workspace file")
    }

    /// Writes the customer, order and store fixtures used across CLI tests.
    pub fn with_sales_fixtures(self) -> Self {
        self.write("customers.csv", CUSTOMERS_CSV);
        self.write("orders.csv", ORDERS_CSV);
        self.write("stores.csv", STORES_CSV);
        self
    }
}

/// The compiled binary with logging silenced.
pub fn blend() -> Command {
    let mut cmd = Command::cargo_bin("csv-blend").expect("binary exists");
    cmd.env("RUST_LOG", "error");
    cmd
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}
