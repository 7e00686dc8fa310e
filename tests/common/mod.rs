#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

pub const AWS_RDS_EXPORT: &str = "\
DB Instance Identifier,Engine,Engine Version,Region,Endpoint Address,Allocated Storage,Status,Owner,Tags
orders-db,postgres,12.15,us-east-1,orders.abc.rds.amazonaws.com,100,available,111122223333,prod;billing
users-db,mysql,8.0.35,us-east-1,users.abc.rds.amazonaws.com,\"1,024\",stopped,111122223333,
legacy-db,mysql,5.7.44,eu-west-1,legacy.abc.rds.amazonaws.com,20,maintenance,444455556666,legacy
";

pub const AZURE_EXPORT: &str = "\
Name,Type,Version,Location,Status,Subscription,Tenant ID
sales-sql,SQL Server,SQL Server 2016,westeurope,Ready,Sales,8b3a5e0e-3d7e-4f76-9b5c-1f3b8e6a7c21
reports-pg,Microsoft.DBforPostgreSQL/flexibleServers,15.4,westeurope,Ready,Analytics,
";

pub const VM_EXPORT: &str = "\
Computer Name,Resource Group,Private IP Address,Subscription,Location,VM Size,OS Type,Display Status,Tenant ID
web-01,rg-web,10.0.0.4,Sales,westeurope,Standard_B2s,Linux,VM running,7df9d676-4a3e-4ff3-a54f-f30c0543fe4c
batch-01,rg-batch,10.0.1.9,Analytics,northeurope,Standard_D4s_v5,Windows,VM deallocated,
";

pub const ACCOUNT_EXPORT: &str = "\
Account ID,Account Alias/Friendly Name,Business Unit,Owner
111122223333,payments-prod,Payments,alice
444455556666,legacy-sandbox,Platform,bob
";

/// Scratch directory holding the store and settings file for one test.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.path().join("inventory.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("cloud-inventory.yml")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("write temp bytes");
        path
    }

    /// The CLI pointed at this workspace's store and settings file.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cloud-inventory").expect("binary exists");
        cmd.current_dir(self.path())
            .env_remove("CLOUD_INVENTORY_STORE")
            .env_remove("CLOUD_INVENTORY_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--store")
            .arg(self.store_path())
            .arg("--config")
            .arg(self.config_path());
        cmd
    }

    /// Runs `args` and parses stdout as JSON.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self
            .command()
            .arg("--json")
            .args(args)
            .output()
            .expect("run cloud-inventory");
        assert!(
            output.status.success(),
            "command {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }

    pub fn import(&self, kind: &str, name: &str, contents: &str, extra: &[&str]) -> serde_json::Value {
        let path = self.write(name, contents);
        let path = path.to_str().expect("utf-8 path");
        let mut args = vec!["import", kind, "-i", path];
        args.extend_from_slice(extra);
        self.json(&args)
    }
}
