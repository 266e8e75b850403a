//! Per-ecosystem install scripts run inside the sandbox.
//!
//! Both installers leave their result under `layer/` in the workdir, laid
//! out the way the platform expects extra dependencies:
//!
//! - Python: `layer/python/lib/<runtime>/site-packages`
//! - Node: `layer/nodejs/node_modules`

use shipfn_core::{Ecosystem, Runtime};

use crate::descriptor::Descriptor;

/// Directory (relative to the workdir) that becomes the layer archive root.
pub const LAYER_DIR: &str = "layer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// Installer name, for error reporting.
    pub installer: &'static str,
    /// Files to copy into the workdir: (source, file name in workdir).
    pub inputs: Vec<(std::path::PathBuf, &'static str)>,
    pub script: String,
    /// Directory the installer must produce, relative to the workdir.
    pub expected_output: String,
}

pub fn plan(descriptor: &Descriptor, runtime: &Runtime) -> InstallPlan {
    match runtime.ecosystem() {
        Ecosystem::Python => python(descriptor, runtime),
        Ecosystem::Node => node(descriptor),
    }
}

fn python(descriptor: &Descriptor, runtime: &Runtime) -> InstallPlan {
    let target = format!("{LAYER_DIR}/python/lib/{runtime}/site-packages");
    let install = format!(
        "mkdir -p {target} && pip3 install --no-cache-dir --disable-pip-version-check \
         -r requirements.txt -t {target}"
    );
    InstallPlan {
        installer: "pip3",
        inputs: vec![(descriptor.path.clone(), "requirements.txt")],
        script: wrap(&install),
        expected_output: target,
    }
}

fn node(descriptor: &Descriptor) -> InstallPlan {
    let mut inputs = vec![(descriptor.path.clone(), "package.json")];
    let install = match &descriptor.lockfile {
        Some(lock) => {
            inputs.push((lock.clone(), "package-lock.json"));
            "npm ci --omit=dev"
        }
        None => "npm install --omit=dev",
    };
    let target = format!("{LAYER_DIR}/nodejs/node_modules");
    let script = format!(
        "{install} && mkdir -p node_modules {LAYER_DIR}/nodejs && mv node_modules {target}"
    );
    InstallPlan {
        installer: "npm",
        inputs,
        script: wrap(&script),
        expected_output: target,
    }
}

/// Preserve the installer's exit status while making the workdir removable
/// by the host user afterwards.
fn wrap(script: &str) -> String {
    format!("{script}; status=$?; chmod -R a+rwX /var/task 2>/dev/null; exit $status")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(ecosystem: Ecosystem, lockfile: Option<&str>) -> Descriptor {
        Descriptor {
            path: PathBuf::from("/proj/deps"),
            ecosystem,
            packages: vec![],
            lockfile: lockfile.map(PathBuf::from),
        }
    }

    #[test]
    fn test_python_plan_targets_site_packages() {
        let rt = Runtime::parse("python3.11").unwrap();
        let plan = plan(&descriptor(Ecosystem::Python, None), &rt);
        assert_eq!(plan.installer, "pip3");
        assert_eq!(plan.expected_output, "layer/python/lib/python3.11/site-packages");
        assert!(plan.script.contains("-r requirements.txt -t layer/python/lib/python3.11/site-packages"));
        assert!(plan.script.ends_with("exit $status"));
    }

    #[test]
    fn test_node_plan_uses_ci_with_lockfile() {
        let rt = Runtime::parse("nodejs18.x").unwrap();
        let with_lock = plan(&descriptor(Ecosystem::Node, Some("/proj/package-lock.json")), &rt);
        assert!(with_lock.script.starts_with("npm ci"));
        assert_eq!(with_lock.inputs.len(), 2);

        let without = plan(&descriptor(Ecosystem::Node, None), &rt);
        assert!(without.script.starts_with("npm install"));
        assert_eq!(without.expected_output, "layer/nodejs/node_modules");
    }
}
