//! Client workload set for connectivity checks
//!
//! One Deployment of `helloworld` replicas joined to a mesh service through
//! the `ns.networkservicemesh.io` annotation, plus a Service in front of it.
//! Availability is judged from the pods the Deployment selector matches.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::exec::WorkloadRef;
use crate::{Error, Result};

/// Annotation that attaches a pod to a network service
pub const NSM_ANNOTATION: &str = "ns.networkservicemesh.io";
/// Label marking the pods as mesh clients
pub const NSM_ROLE_LABEL: &str = "nsm/role";

const APP_LABEL: &str = "app";
const VERSION_LABEL: &str = "version";
const VERSION: &str = "v1";
const CPU_REQUEST: &str = "100m";

/// Shape of the client workload set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientWorkload {
    /// Namespace everything is created in
    pub namespace: String,
    /// Network service the clients join
    pub service: String,
    /// Replica count
    pub replicas: i32,
    /// Container name, also the exec target
    pub container: String,
    /// Container image
    pub image: String,
    /// Port the container serves on
    pub port: i32,
}

impl Default for ClientWorkload {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            service: "vl3-service".to_string(),
            replicas: 2,
            container: "helloworld".to_string(),
            image: "docker.io/istio/examples-helloworld-v1".to_string(),
            port: 5000,
        }
    }
}

impl ClientWorkload {
    /// `helloworld-<service>`, shared by the Deployment, Service and app label
    pub fn name(&self) -> String {
        format!("helloworld-{}", self.service)
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), self.name()),
            (VERSION_LABEL.to_string(), VERSION.to_string()),
        ])
    }

    /// Label selector string matching the Deployment's pods
    pub fn label_selector(&self) -> String {
        self.selector_labels()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Deployment manifest
    pub fn deployment(&self) -> Deployment {
        let container = Container {
            name: self.container.clone(),
            image: Some(self.image.clone()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "cpu".to_string(),
                    Quantity(CPU_REQUEST.to_string()),
                )])),
                ..Default::default()
            }),
            ports: Some(vec![ContainerPort {
                container_port: self.port,
                ..Default::default()
            }]),
            ..Default::default()
        };

        Deployment {
            metadata: ObjectMeta {
                name: Some(self.name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    VERSION_LABEL.to_string(),
                    VERSION.to_string(),
                )])),
                annotations: Some(BTreeMap::from([(
                    NSM_ANNOTATION.to_string(),
                    self.service.clone(),
                )])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.selector_labels()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some("Always".to_string()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Service manifest selecting the Deployment's pods
    pub fn service_manifest(&self) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(self.name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([
                    (APP_LABEL.to_string(), self.name()),
                    (NSM_ROLE_LABEL.to_string(), "client".to_string()),
                ])),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: self.port,
                    ..Default::default()
                }]),
                selector: Some(BTreeMap::from([(APP_LABEL.to_string(), self.name())])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Cluster API surface used for the client workload set.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Create a Deployment, returning the stored object
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// Create a Service, returning the stored object
    async fn create_service(&self, service: &Service) -> Result<Service>;

    /// List pods in `namespace` matching `selector`
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;
}

/// [`WorkloadApi`] over a kube client
#[derive(Clone)]
pub struct KubeWorkloads {
    client: Client,
}

impl KubeWorkloads {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Create `object`, or fetch it if it already exists
async fn create_or_get<K>(api: &Api<K>, kind: &'static str, object: &K) -> Result<K>
where
    K: kube::Resource + Clone + Debug + Serialize + DeserializeOwned,
{
    let name = object.name_any();
    match api.create(&PostParams::default(), object).await {
        Ok(created) => {
            info!(kind, name = %name, "Created");
            Ok(created)
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            info!(kind, name = %name, "Already exists, reusing");
            api.get(&name)
                .await
                .map_err(|e| Error::deploy(kind, &name, e.to_string()))
        }
        Err(e) => Err(Error::deploy(kind, &name, e.to_string())),
    }
}

fn namespace_of(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or("default")
}

#[async_trait]
impl WorkloadApi for KubeWorkloads {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let api: Api<Deployment> =
            Api::namespaced(self.client.clone(), namespace_of(&deployment.metadata));
        create_or_get(&api, "Deployment", deployment).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let api: Api<Service> =
            Api::namespaced(self.client.clone(), namespace_of(&service.metadata));
        create_or_get(&api, "Service", service).await
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        Ok(pods.items)
    }
}

/// Create the client Deployment and its Service.
///
/// Either creation failing is an error naming the resource; the Service is
/// not attempted when the Deployment fails.
pub async fn deploy_clients<A: WorkloadApi + ?Sized>(
    api: &A,
    workload: &ClientWorkload,
) -> Result<Deployment> {
    info!(
        name = %workload.name(),
        namespace = %workload.namespace,
        replicas = workload.replicas,
        "Deploying client workloads"
    );
    let deployment = api.create_deployment(&workload.deployment()).await?;
    api.create_service(&workload.service_manifest()).await?;
    Ok(deployment)
}

fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

/// One availability check: the selected pods, once all of them are running.
///
/// Fewer pods than replicas, or any pod not in the `Running` phase, is
/// [`Error::NotReady`] so the caller can retry.
pub async fn check_availability<A: WorkloadApi + ?Sized>(
    api: &A,
    workload: &ClientWorkload,
) -> Result<Vec<WorkloadRef>> {
    let selector = workload.label_selector();
    let pods = api.list_pods(&workload.namespace, &selector).await?;

    let expected = usize::try_from(workload.replicas).unwrap_or(0).max(1);
    if pods.len() < expected {
        return Err(Error::NotReady(format!(
            "{} of {} pods matching {} exist",
            pods.len(),
            expected,
            selector
        )));
    }

    if let Some(pod) = pods.iter().find(|p| pod_phase(p) != "Running") {
        return Err(Error::NotReady(format!(
            "pod {} is {}",
            pod.name_any(),
            pod_phase(pod)
        )));
    }

    let refs: Vec<WorkloadRef> = pods
        .iter()
        .map(|p| WorkloadRef::new(&workload.namespace, p.name_any(), &workload.container))
        .collect();
    debug!(pods = ?refs.iter().map(|r| r.pod.as_str()).collect::<Vec<_>>(), "All pods running");
    Ok(refs)
}
