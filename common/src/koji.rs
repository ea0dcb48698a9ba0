//! Koji hub client.
//!
//! Koji speaks XML-RPC. Requests are encoded with the `xmlrpc` crate and sent
//! through the shared reqwest client so timeouts and the user agent apply.

use crate::errors::*;
use crate::http;
use crate::rpm::{Cmp, Nvra};
use data_encoding::BASE64;
use reqwest::header::CONTENT_TYPE;
use std::collections::{BTreeMap, HashMap};
use std::io;
use xmlrpc::{Request, Transport, Value};

pub const REPO_READY: i32 = 1;
pub const DEP_REQUIRE: i32 = 0;
const MULTICALL_CHUNK: usize = 100;

pub fn repo_url(topurl: &str, tag: &str, repo_id: i64, arch: &str) -> String {
    format!(
        "{}/repos/{}/{}/{}/",
        topurl.trim_end_matches('/'),
        tag,
        repo_id,
        arch
    )
}

struct HttpTransport<'a> {
    client: &'a http::Client,
    url: &'a str,
}

impl Transport for HttpTransport<'_> {
    type Stream = io::Cursor<Vec<u8>>;

    fn transmit(
        self,
        request: &Request<'_>,
    ) -> std::result::Result<Self::Stream, Box<dyn std::error::Error + Send + Sync>> {
        let mut body = Vec::new();
        request.write_as_xml(&mut body)?;
        let bytes = self
            .client
            .post(self.url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body)
            .send()?
            .error_for_status()?
            .bytes()?;
        Ok(io::Cursor::new(bytes.to_vec()))
    }
}

/// Keyword arguments are passed as a trailing struct flagged with `__starstar`.
pub fn kwargs<I: IntoIterator<Item = (&'static str, Value)>>(args: I) -> Value {
    let mut map = args
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect::<BTreeMap<_, _>>();
    map.insert("__starstar".to_string(), Value::Bool(true));
    Value::Struct(map)
}

fn require_struct(val: &Value) -> Result<&BTreeMap<String, Value>> {
    match val {
        Value::Struct(map) => Ok(map),
        _ => bail!("Expected struct, got {:?}", val),
    }
}

fn require_array(val: &Value) -> Result<&[Value]> {
    match val {
        Value::Array(items) => Ok(items),
        _ => bail!("Expected array, got {:?}", val),
    }
}

fn require_str<'a>(val: &'a BTreeMap<String, Value>, k: &str) -> Result<&'a str> {
    let s = val.get(k).ok_or_else(|| anyhow!("Missing key {}", k))?;
    s.as_str()
        .ok_or_else(|| anyhow!("Key {} is not a string", k))
}

fn require_i64(val: &BTreeMap<String, Value>, k: &str) -> Result<i64> {
    let i = val.get(k).ok_or_else(|| anyhow!("Missing key {}", k))?;
    i.as_i64()
        .ok_or_else(|| anyhow!("Key {} is not an integer", k))
}

fn optional_i64(val: &BTreeMap<String, Value>, k: &str) -> Option<i64> {
    val.get(k).and_then(Value::as_i64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    pub id: i64,
    pub nvr: String,
    pub task_id: Option<i64>,
}

impl Build {
    fn from_value(val: &Value) -> Result<Build> {
        let build = require_struct(val)?;
        Ok(Build {
            id: require_i64(build, "id")?,
            nvr: require_str(build, "nvr")?.to_string(),
            task_id: optional_i64(build, "task_id"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub label: Option<String>,
}

impl Task {
    fn from_value(val: &Value) -> Result<Task> {
        let task = require_struct(val)?;
        Ok(Task {
            id: require_i64(task, "id")?,
            label: task.get("label").and_then(Value::as_str).map(String::from),
        })
    }
}

/// Turn a `getRPMDeps` entry into a requirement string like `foo >= 1.0`.
fn format_requirement(val: &Value) -> Result<String> {
    let dep = require_struct(val)?;
    let name = require_str(dep, "name")?;
    let version = dep.get("version").and_then(Value::as_str).unwrap_or("");
    let flags = optional_i64(dep, "flags").unwrap_or(0) as u32;

    match Cmp::from_sense(flags) {
        Some(cmp) if !version.is_empty() => Ok(format!("{} {} {}", name, cmp.as_str(), version)),
        _ => Ok(name.to_string()),
    }
}

/// Unwrap the per-call results of `system.multicall`.
fn multicall_results(method: &str, response: Value) -> Result<Vec<Value>> {
    let items = match response {
        Value::Array(items) => items,
        other => bail!("Expected array from multicall, got {:?}", other),
    };
    items
        .into_iter()
        .map(|item| -> Result<Value> {
            match item {
                Value::Array(mut result) if result.len() == 1 => Ok(result.remove(0)),
                Value::Struct(fault) => {
                    let code = optional_i64(&fault, "faultCode").unwrap_or(0);
                    let msg = fault
                        .get("faultString")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown fault");
                    bail!("Koji {}() failed ({}): {}", method, code, msg)
                }
                other => bail!("Unexpected multicall item from {}(): {:?}", method, other),
            }
        })
        .collect()
}

/// A single XML-RPC round trip.
pub trait Rpc {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value>;
}

pub struct HubRpc {
    hub: String,
    client: http::Client,
}

impl Rpc for HubRpc {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        trace!("Calling koji {}() on {:?}", method, self.hub);
        let mut req = Request::new(method);
        for arg in args {
            req = req.arg(arg);
        }
        let transport = HttpTransport {
            client: &self.client,
            url: &self.hub,
        };
        Ok(req.call(transport)?)
    }
}

pub struct KojiSession<R = HubRpc> {
    rpc: R,
}

impl KojiSession {
    pub fn new<I: Into<String>>(client: http::Client, hub: I) -> KojiSession {
        let hub = hub.into();
        debug!("setting koji hub to {:?}", hub);
        KojiSession {
            rpc: HubRpc { hub, client },
        }
    }
}

impl<R: Rpc> KojiSession<R> {
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.rpc
            .call(method, args)
            .with_context(|| format!("Invoking koji {}()", method))
    }

    /// Call the same method once per argument list, batched with `system.multicall`.
    pub fn multicall(&self, method: &str, calls: Vec<Vec<Value>>) -> Result<Vec<Value>> {
        let mut results = Vec::with_capacity(calls.len());
        let mut calls = calls.into_iter().peekable();

        while calls.peek().is_some() {
            let chunk = calls
                .by_ref()
                .take(MULTICALL_CHUNK)
                .map(|params| {
                    let mut call = BTreeMap::new();
                    call.insert("methodName".to_string(), Value::from(method));
                    call.insert("params".to_string(), Value::Array(params));
                    Value::Struct(call)
                })
                .collect::<Vec<_>>();
            debug!("Sending multicall with {} {}() calls", chunk.len(), method);
            let response = self.call("system.multicall", vec![Value::Array(chunk)])?;
            results.extend(multicall_results(method, response)?);
        }

        Ok(results)
    }

    pub fn get_repo(&self, tag: &str) -> Result<i64> {
        let repo = self.call("getRepo", vec![tag.into(), Value::Int(REPO_READY)])?;
        if let Value::Nil = repo {
            bail!("Tag {:?} has no ready repo", tag);
        }
        require_i64(require_struct(&repo)?, "id")
    }

    pub fn list_packages(&self, tag: &str) -> Result<Vec<String>> {
        let pkgs = self.call("listPackages", vec![kwargs([("tagID", tag.into())])])?;
        let mut names = Vec::new();
        for pkg in require_array(&pkgs)? {
            let pkg = require_struct(pkg)?;
            if pkg.get("blocked").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            names.push(require_str(pkg, "package_name")?.to_string());
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Version of the latest build of every package tagged into `tag`.
    pub fn list_tagged_latest(&self, tag: &str) -> Result<HashMap<String, String>> {
        let builds = self.call(
            "listTagged",
            vec![tag.into(), kwargs([("latest", Value::Bool(true))])],
        )?;
        let mut versions = HashMap::new();
        for build in require_array(&builds)? {
            let build = require_struct(build)?;
            versions.insert(
                require_str(build, "package_name")?.to_string(),
                require_str(build, "version")?.to_string(),
            );
        }
        Ok(versions)
    }

    pub fn get_builds(&self, nvrs: &[String]) -> Result<Vec<Build>> {
        let calls = nvrs.iter().map(|nvr| vec![nvr.as_str().into()]).collect();
        self.multicall("getBuild", calls)?
            .iter()
            .zip(nvrs)
            .map(|(build, nvr)| -> Result<Build> {
                if let Value::Nil = build {
                    bail!("Build not found: {:?}", nvr);
                }
                Build::from_value(build)
            })
            .collect()
    }

    /// Names of the rpms of each build, limited to `arches`.
    pub fn list_rpms(&self, build_ids: &[i64], arches: &[&str]) -> Result<Vec<Vec<String>>> {
        let arches = Value::Array(arches.iter().map(|a| Value::from(*a)).collect());
        let calls = build_ids
            .iter()
            .map(|id| {
                vec![kwargs([
                    ("buildID", Value::Int64(*id)),
                    ("arches", arches.clone()),
                ])]
            })
            .collect();
        self.multicall("listRPMs", calls)?
            .iter()
            .map(|rpms| -> Result<Vec<String>> {
                require_array(rpms)?
                    .iter()
                    .map(|rpm| -> Result<String> {
                        Ok(require_str(require_struct(rpm)?, "name")?.to_string())
                    })
                    .collect()
            })
            .collect()
    }

    pub fn get_task_children(&self, task_ids: &[i64]) -> Result<Vec<Vec<Task>>> {
        let calls = task_ids.iter().map(|id| vec![Value::Int64(*id)]).collect();
        self.multicall("getTaskChildren", calls)?
            .iter()
            .map(|tasks| -> Result<Vec<Task>> {
                require_array(tasks)?.iter().map(Task::from_value).collect()
            })
            .collect()
    }

    /// Requirements of the given source rpms, without `rpmlib(...)` entries.
    pub fn get_rpm_requires(&self, srpms: &[Nvra]) -> Result<Vec<Vec<String>>> {
        let calls = srpms
            .iter()
            .map(|nvra| {
                let mut info = BTreeMap::new();
                info.insert("name".to_string(), Value::from(nvra.name.as_str()));
                info.insert("version".to_string(), Value::from(nvra.version.as_str()));
                info.insert("release".to_string(), Value::from(nvra.release.as_str()));
                info.insert("arch".to_string(), Value::from("src"));
                vec![Value::Struct(info), Value::Int(DEP_REQUIRE)]
            })
            .collect();
        self.multicall("getRPMDeps", calls)?
            .iter()
            .map(|deps| -> Result<Vec<String>> {
                let mut requires = Vec::new();
                for dep in require_array(deps)? {
                    let req = format_requirement(dep)?;
                    if !req.starts_with("rpmlib(") {
                        requires.push(req);
                    }
                }
                Ok(requires)
            })
            .collect()
    }

    pub fn download_task_output(&self, task_id: i64, file: &str) -> Result<Vec<u8>> {
        let output = self.call(
            "downloadTaskOutput",
            vec![Value::Int64(task_id), file.into()],
        )?;
        match output {
            Value::Base64(bytes) => Ok(bytes),
            Value::String(encoded) => BASE64
                .decode(encoded.trim().as_bytes())
                .with_context(|| format!("Failed to decode {:?} of task {}", file, task_id)),
            other => bail!("Unexpected task output: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Answers calls from a closure and keeps every request.
    struct FakeHub<F> {
        calls: RefCell<Vec<(String, Vec<Value>)>>,
        respond: F,
    }

    impl<F: Fn(&str, &[Value]) -> Value> Rpc for FakeHub<F> {
        fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
            let response = (self.respond)(method, &args);
            self.calls.borrow_mut().push((method.to_string(), args));
            Ok(response)
        }
    }

    fn session<F: Fn(&str, &[Value]) -> Value>(respond: F) -> KojiSession<FakeHub<F>> {
        KojiSession {
            rpc: FakeHub {
                calls: RefCell::default(),
                respond,
            },
        }
    }

    /// Params of every call batched into a `system.multicall` of `expected`.
    fn each_call<'a>(method: &str, args: &'a [Value], expected: &str) -> Vec<&'a [Value]> {
        assert_eq!(method, "system.multicall");
        let Value::Array(calls) = &args[0] else {
            panic!("multicall without call list: {:?}", args);
        };
        calls
            .iter()
            .map(|call| {
                let call = call.as_struct().unwrap();
                assert_eq!(call["methodName"], Value::from(expected));
                match &call["params"] {
                    Value::Array(params) => params.as_slice(),
                    other => panic!("params are not an array: {:?}", other),
                }
            })
            .collect()
    }

    fn strukt(items: &[(&str, Value)]) -> Value {
        Value::Struct(
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_repo_url() {
        assert_eq!(
            repo_url("https://kojipkgs.fedoraproject.org/", "f29-build", 1234, "x86_64"),
            "https://kojipkgs.fedoraproject.org/repos/f29-build/1234/x86_64/"
        );
    }

    #[test]
    fn test_kwargs() {
        let v = kwargs([("latest", Value::Bool(true))]);
        let map = v.as_struct().unwrap();
        assert_eq!(map.get("__starstar"), Some(&Value::Bool(true)));
        assert_eq!(map.get("latest"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_build_from_value() -> Result<()> {
        let build = Build::from_value(&strukt(&[
            ("id", Value::Int(1144371)),
            ("nvr", Value::from("junit-4.12-9.fc29")),
            ("task_id", Value::Int(29195416)),
        ]))?;
        assert_eq!(
            build,
            Build {
                id: 1144371,
                nvr: "junit-4.12-9.fc29".to_string(),
                task_id: Some(29195416),
            }
        );

        let build = Build::from_value(&strukt(&[
            ("id", Value::Int(1)),
            ("nvr", Value::from("imported-1-1")),
            ("task_id", Value::Nil),
        ]))?;
        assert_eq!(build.task_id, None);
        Ok(())
    }

    #[test]
    fn test_format_requirement() -> Result<()> {
        let dep = strukt(&[
            ("name", Value::from("mvn(junit:junit)")),
            ("version", Value::from("")),
            ("flags", Value::Int(0)),
        ]);
        assert_eq!(format_requirement(&dep)?, "mvn(junit:junit)");

        let dep = strukt(&[
            ("name", Value::from("maven-local")),
            ("version", Value::from("5.2.0")),
            ("flags", Value::Int(12)),
        ]);
        assert_eq!(format_requirement(&dep)?, "maven-local >= 5.2.0");
        Ok(())
    }

    #[test]
    fn test_multicall_results() -> Result<()> {
        let response = Value::Array(vec![
            Value::Array(vec![Value::Int(1)]),
            Value::Array(vec![Value::Nil]),
        ]);
        assert_eq!(
            multicall_results("getBuild", response)?,
            vec![Value::Int(1), Value::Nil]
        );
        Ok(())
    }

    #[test]
    fn test_multicall_fault() {
        let response = Value::Array(vec![strukt(&[
            ("faultCode", Value::Int(1000)),
            ("faultString", Value::from("No such build")),
        ])]);
        let err = multicall_results("getBuild", response).unwrap_err();
        assert!(err.to_string().contains("No such build"));
    }

    #[test]
    fn test_multicall_batches() -> Result<()> {
        let session = session(|method, args| {
            let results = each_call(method, args, "getBuild")
                .into_iter()
                .map(|params| {
                    let nvr = params[0].as_str().unwrap();
                    let id = nvr
                        .trim_start_matches("pkg")
                        .split('-')
                        .next()
                        .unwrap()
                        .parse::<i64>()
                        .unwrap();
                    Value::Array(vec![strukt(&[
                        ("id", Value::Int64(id)),
                        ("nvr", Value::from(nvr)),
                        ("task_id", Value::Nil),
                    ])])
                })
                .collect();
            Value::Array(results)
        });

        let nvrs = (0..250)
            .map(|i| format!("pkg{}-1.0-1.fc29", i))
            .collect::<Vec<_>>();
        let builds = session.get_builds(&nvrs)?;
        assert_eq!(builds.len(), 250);
        for (i, build) in builds.iter().enumerate() {
            assert_eq!(build.id, i as i64);
            assert_eq!(build.nvr, nvrs[i]);
        }

        let batches = session
            .rpc
            .calls
            .borrow()
            .iter()
            .map(|(_, args)| match &args[0] {
                Value::Array(calls) => calls.len(),
                _ => 0,
            })
            .collect::<Vec<_>>();
        assert_eq!(batches, vec![100, 100, 50]);
        Ok(())
    }

    #[test]
    fn test_get_builds_missing() {
        let session = session(|method, args| {
            let results = each_call(method, args, "getBuild")
                .into_iter()
                .map(|_| Value::Array(vec![Value::Nil]))
                .collect();
            Value::Array(results)
        });
        let err = session
            .get_builds(&["maven-3.5.4-1.fc29".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("maven-3.5.4-1.fc29"));
    }

    #[test]
    fn test_list_rpms() -> Result<()> {
        let session = session(|method, args| {
            let results = each_call(method, args, "listRPMs")
                .into_iter()
                .map(|params| {
                    let kwargs = params[0].as_struct().unwrap();
                    assert_eq!(kwargs["__starstar"], Value::Bool(true));
                    assert_eq!(
                        kwargs["arches"],
                        Value::Array(vec![Value::from("noarch"), Value::from("x86_64")])
                    );
                    let rpms = match kwargs["buildID"] {
                        Value::Int64(1144371) => vec!["junit", "junit-javadoc"],
                        _ => vec!["maven"],
                    };
                    let rpms = rpms
                        .into_iter()
                        .map(|name| strukt(&[("name", Value::from(name))]))
                        .collect();
                    Value::Array(vec![Value::Array(rpms)])
                })
                .collect();
            Value::Array(results)
        });

        let rpms = session.list_rpms(&[1144371, 7], &["noarch", "x86_64"])?;
        assert_eq!(
            rpms,
            vec![vec!["junit".to_string(), "junit-javadoc".to_string()], vec!["maven".to_string()]]
        );
        Ok(())
    }

    #[test]
    fn test_get_rpm_requires() -> Result<()> {
        let session = session(|method, args| {
            let results = each_call(method, args, "getRPMDeps")
                .into_iter()
                .map(|params| {
                    let info = params[0].as_struct().unwrap();
                    assert_eq!(info["name"], Value::from("maven"));
                    assert_eq!(info["version"], Value::from("3.5.4"));
                    assert_eq!(info["release"], Value::from("1.fc29"));
                    assert_eq!(info["arch"], Value::from("src"));
                    assert_eq!(params[1], Value::Int(DEP_REQUIRE));
                    Value::Array(vec![Value::Array(vec![
                        strukt(&[
                            ("name", Value::from("rpmlib(CompressedFileNames)")),
                            ("version", Value::from("3.0.4-1")),
                            ("flags", Value::Int(16777226)),
                        ]),
                        strukt(&[
                            ("name", Value::from("maven-local")),
                            ("version", Value::from("")),
                            ("flags", Value::Int(0)),
                        ]),
                        strukt(&[
                            ("name", Value::from("mvn(junit:junit)")),
                            ("version", Value::from("4.12")),
                            ("flags", Value::Int(12)),
                        ]),
                    ])])
                })
                .collect();
            Value::Array(results)
        });

        let requires = session.get_rpm_requires(&[Nvra::parse("maven-3.5.4-1.fc29.src.rpm")?])?;
        assert_eq!(
            requires,
            vec![vec!["maven-local".to_string(), "mvn(junit:junit) >= 4.12".to_string()]]
        );
        Ok(())
    }

    #[test]
    fn test_list_packages() -> Result<()> {
        let session = session(|method, args| {
            assert_eq!(method, "listPackages");
            let kwargs = args[0].as_struct().unwrap();
            assert_eq!(kwargs["tagID"], Value::from("jp"));
            assert_eq!(kwargs["__starstar"], Value::Bool(true));
            Value::Array(vec![
                strukt(&[("package_name", Value::from("xmvn")), ("blocked", Value::Bool(false))]),
                strukt(&[("package_name", Value::from("maven")), ("blocked", Value::Bool(true))]),
                strukt(&[("package_name", Value::from("ant"))]),
                strukt(&[("package_name", Value::from("xmvn")), ("blocked", Value::Bool(false))]),
            ])
        });
        assert_eq!(session.list_packages("jp")?, vec!["ant", "xmvn"]);
        Ok(())
    }

    #[test]
    fn test_get_repo() -> Result<()> {
        let ready = session(|method, args| {
            assert_eq!(method, "getRepo");
            assert_eq!(args, [Value::from("f29-build"), Value::Int(REPO_READY)]);
            strukt(&[("id", Value::Int(1234)), ("state", Value::Int(REPO_READY))])
        });
        assert_eq!(ready.get_repo("f29-build")?, 1234);

        let missing = session(|_, _| Value::Nil);
        let err = missing.get_repo("f29-build").unwrap_err();
        assert!(err.to_string().contains("has no ready repo"));
        Ok(())
    }
}
