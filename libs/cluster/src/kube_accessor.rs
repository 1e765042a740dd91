//! Kubernetes-backed [`ClusterAccessor`].

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Event, Namespace, Pod, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use shipmate_health::{WorkloadKind, WorkloadSnapshot};
use tracing::{debug, info};

use crate::convert::{
    cron_job_snapshot, daemon_set_snapshot, deployment_snapshot, event_record, job_snapshot,
    pod_snapshot, stateful_set_snapshot,
};
use crate::record::{latest_release_record, ReleaseRecord};
use crate::{instance_selector, ClusterAccessor, ClusterError, EventRecord};

/// [`ClusterAccessor`] over a kube-rs client.
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig or in-cluster configuration.
    ///
    /// With `context` set, that kubeconfig context is used instead of the
    /// current one.
    pub async fn connect(context: Option<&str>) -> Result<Self, ClusterError> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| ClusterError::Config(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| ClusterError::Config(e.to_string()))?,
        };

        info!(cluster_url = %config.cluster_url, "Connecting to cluster");
        let client = Client::try_from(config).map_err(ClusterError::from_api)?;
        Ok(Self::new(client))
    }

    async fn list_labelled<K>(&self, namespace: &str, selector: &str) -> Result<Vec<K>, ClusterError>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(ClusterError::from_api)?;
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterAccessor for KubeAccessor {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let found = api.get_opt(namespace).await.map_err(ClusterError::from_api)?;
        Ok(found.is_some())
    }

    async fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace, "Created namespace");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                debug!(namespace, "Namespace already exists");
                Ok(())
            }
            Err(e) => Err(ClusterError::from_api(e)),
        }
    }

    async fn find_release(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Option<ReleaseRecord>, ClusterError> {
        let selector = format!("owner=helm,name={}", release);
        let secrets: Vec<Secret> = self.list_labelled(namespace, &selector).await?;

        let labels: Vec<(String, String)> = secrets
            .iter()
            .filter_map(|secret| {
                let labels = secret.metadata.labels.as_ref()?;
                Some((labels.get("version")?.clone(), labels.get("status")?.clone()))
            })
            .collect();

        let record = latest_release_record(
            release,
            labels.iter().map(|(v, s)| (v.as_str(), s.as_str())),
        );
        debug!(namespace, release, ?record, "Looked up release record");
        Ok(record)
    }

    async fn workloads(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Vec<WorkloadSnapshot>, ClusterError> {
        let selector = instance_selector(release);
        let mut snapshots = Vec::new();

        let deployments: Vec<Deployment> = self.list_labelled(namespace, &selector).await?;
        snapshots.extend(deployments.iter().map(deployment_snapshot));

        let stateful_sets: Vec<StatefulSet> = self.list_labelled(namespace, &selector).await?;
        snapshots.extend(stateful_sets.iter().map(stateful_set_snapshot));

        let daemon_sets: Vec<DaemonSet> = self.list_labelled(namespace, &selector).await?;
        snapshots.extend(daemon_sets.iter().map(daemon_set_snapshot));

        let jobs: Vec<Job> = self.list_labelled(namespace, &selector).await?;
        snapshots.extend(jobs.iter().map(job_snapshot));

        let cron_jobs: Vec<CronJob> = self.list_labelled(namespace, &selector).await?;
        snapshots.extend(cron_jobs.iter().map(cron_job_snapshot));

        let now = Utc::now();
        let pods: Vec<Pod> = self.list_labelled(namespace, &selector).await?;
        snapshots.extend(pods.iter().map(|pod| pod_snapshot(pod, now)));

        debug!(namespace, release, count = snapshots.len(), "Snapshotted workloads");
        Ok(snapshots)
    }

    async fn services(&self, namespace: &str, release: &str) -> Result<Vec<String>, ClusterError> {
        let services: Vec<Service> = self
            .list_labelled(namespace, &instance_selector(release))
            .await?;
        Ok(services
            .into_iter()
            .filter_map(|service| service.metadata.name)
            .collect())
    }

    async fn events(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, ClusterError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("involvedObject.kind={},involvedObject.name={}", kind, name);
        let list = api
            .list(&ListParams::default().fields(&selector))
            .await
            .map_err(ClusterError::from_api)?;

        let mut events: Vec<EventRecord> = list.items.iter().map(event_record).collect();
        events.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        events.truncate(limit);
        Ok(events)
    }
}
