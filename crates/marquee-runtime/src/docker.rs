use crate::engine::{
    ContainerDetails, ContainerEngine, ContainerFilter, ContainerSummary, EngineError, LogChunk,
    LogStream, MountPointInfo, VolumeDetails, WaitCondition,
};
use crate::spec::{ContainerSpec, MountSource, MountSpec};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{DeviceMapping, HostConfig, Mount, MountTypeEnum};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::{StreamExt, TryStreamExt};
use marquee_schema::EngineSection;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Docker-compatible engine (Docker or Podman's compat socket) over bollard.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect(config: &EngineSection) -> Result<Self, EngineError> {
        let docker = match config.socket.as_deref() {
            Some(socket) => {
                debug!("connecting to engine at {socket}");
                Docker::connect_with_unix(socket, config.timeout_secs, API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(classify)?;
        Ok(Self { docker })
    }
}

fn classify(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            404 => EngineError::NotFound(message),
            304 => EngineError::NotModified(message),
            409 => EngineError::Conflict(message),
            status => EngineError::Api { status, message },
        },
        other => EngineError::Transport(other.to_string()),
    }
}

fn to_mount(spec: &MountSpec) -> Mount {
    let (typ, source) = match &spec.source {
        MountSource::Bind(path) => (MountTypeEnum::BIND, path.to_string_lossy().into_owned()),
        MountSource::Volume(name) => (MountTypeEnum::VOLUME, name.clone()),
    };
    Mount {
        target: Some(spec.target.to_string_lossy().into_owned()),
        source: Some(source),
        typ: Some(typ),
        read_only: Some(spec.read_only),
        ..Default::default()
    }
}

fn to_config(spec: &ContainerSpec) -> Config<String> {
    let devices = spec
        .devices
        .iter()
        .map(|d| DeviceMapping {
            path_on_host: Some(d.host.to_string_lossy().into_owned()),
            path_in_container: Some(d.container.to_string_lossy().into_owned()),
            cgroup_permissions: Some(d.permissions.clone()),
        })
        .collect();

    let host_config = HostConfig {
        mounts: Some(spec.mounts.iter().map(to_mount).collect()),
        devices: Some(devices),
        ipc_mode: spec.ipc_mode.map(|m| m.as_str().to_owned()),
        security_opt: (!spec.security_opts.is_empty()).then(|| spec.security_opts.clone()),
        auto_remove: Some(spec.auto_remove),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        entrypoint: spec.entrypoint.clone(),
        cmd: spec.command.clone(),
        env: Some(spec.env_strings()),
        working_dir: spec.working_dir.clone(),
        labels: Some(spec.labels.clone().into_iter().collect()),
        tty: Some(spec.tty),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn to_chunk(output: LogOutput) -> LogChunk {
    match output {
        LogOutput::StdOut { message } => LogChunk::new(LogStream::Stdout, message.to_vec()),
        LogOutput::StdErr { message } => LogChunk::new(LogStream::Stderr, message.to_vec()),
        LogOutput::StdIn { message } | LogOutput::Console { message } => {
            LogChunk::new(LogStream::Console, message.to_vec())
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await.map(|_| ()).map_err(classify)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), to_config(spec))
            .await
            .map_err(classify)?;
        for warning in &response.warnings {
            debug!("engine warning for {}: {warning}", spec.name);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)
    }

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace_secs }))
            .await
            .map_err(classify)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(classify)
    }

    async fn wait_container(
        &self,
        id: &str,
        condition: WaitCondition,
    ) -> Result<i64, EngineError> {
        let options = WaitContainerOptions {
            condition: condition.as_str(),
        };
        let mut stream = Box::pin(self.docker.wait_container(id, Some(options)));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(classify(e)),
            None => Err(EngineError::Transport(format!(
                "wait stream for {id} closed without a status"
            ))),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(classify)?;
        let state = info.state.unwrap_or_default();
        let mounts = info
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountPointInfo {
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
                volume: m.name,
            })
            .collect();

        Ok(ContainerDetails {
            id: info.id.unwrap_or_else(|| id.to_owned()),
            name: info
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_owned(),
            status: state
                .status
                .map_or_else(|| "unknown".to_owned(), |s| s.to_string()),
            running: state.running.unwrap_or(false),
            created: info.created,
            exit_code: state.exit_code,
            mounts,
        })
    }

    async fn container_logs(&self, id: &str, tail: usize) -> Result<Vec<LogChunk>, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        self.docker
            .logs(id, Some(options))
            .map_ok(to_chunk)
            .try_collect()
            .await
            .map_err(classify)
    }

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let (key, value, prefix) = match filter {
            ContainerFilter::Volume(name) => ("volume", name.clone(), None),
            ContainerFilter::NamePrefix(prefix) => ("name", prefix.clone(), Some(prefix)),
        };
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([(key.to_owned(), vec![value])]),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(classify)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let names: Vec<String> = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .collect();
                Some(ContainerSummary {
                    id,
                    names,
                    state: c.state.unwrap_or_default(),
                })
            })
            // the engine's name filter matches substrings
            .filter(|c| prefix.map_or(true, |p| c.names.iter().any(|n| n.starts_with(p.as_str()))))
            .collect())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetails, EngineError> {
        let volume = self.docker.inspect_volume(name).await.map_err(classify)?;
        Ok(VolumeDetails {
            name: volume.name,
            options: volume.options.into_iter().collect(),
            labels: volume.labels.into_iter().collect(),
        })
    }

    async fn create_volume(
        &self,
        name: &str,
        host_dir: &Path,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), EngineError> {
        let driver_opts = HashMap::from([
            ("type".to_owned(), "none".to_owned()),
            ("o".to_owned(), "bind".to_owned()),
            ("device".to_owned(), host_dir.to_string_lossy().into_owned()),
        ]);
        let options = CreateVolumeOptions {
            name: name.to_owned(),
            driver: "local".to_owned(),
            driver_opts,
            labels: labels.clone().into_iter().collect(),
        };
        self.docker
            .create_volume(options)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(classify)
    }
}
