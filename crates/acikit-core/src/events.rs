// ── Typed class events ──
//
// Class-level subscriptions on top of the session's URL queues. Raw
// `{className: {attributes}}` items become `MoEvent`s; the graph can
// apply them to stay in step with the controller.

use std::collections::BTreeMap;
use std::future::Future;

use acikit_api::{Query, Session, SubscriptionEvent};
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::CoreError;
use crate::graph::{Lifecycle, MoGraph, MoId, RelationKind};
use crate::registry::MoClass;
use crate::wire::{self, DERIVED_ATTRIBUTES, IngestOptions, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EventStatus {
    Created,
    Modified,
    Deleted,
}

/// One object change as reported by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct MoEvent {
    /// Controller class name (`fvTenant`, `fvRsBd`, ...).
    pub class: String,
    pub dn: String,
    pub status: EventStatus,
    /// Every attribute the event carried, `dn` and `status` included.
    pub attributes: BTreeMap<String, String>,
    /// The object's `modTs`, when present and well-formed.
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl MoEvent {
    /// Decode a `{className: {attributes}}` item.
    ///
    /// Items without a `status` are treated as created.
    pub fn from_item(value: &Value) -> Result<Self, CoreError> {
        let item = Item::parse(value)
            .ok_or_else(|| CoreError::invalid_structure(format!("malformed event: {value}")))?;
        let dn = item
            .attr("dn")
            .ok_or_else(|| CoreError::invalid_structure(format!("{} event without a dn", item.class)))?
            .to_owned();
        let status = match item.attr("status") {
            None | Some("") => EventStatus::Created,
            Some(s) => s
                .parse()
                .map_err(|_| CoreError::invalid_structure(format!("unknown event status `{s}`")))?,
        };
        let timestamp = item
            .attr("modTs")
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok());
        Ok(Self {
            class: item.class.to_owned(),
            dn,
            status,
            attributes: item.attributes().map(|(k, v)| (k.to_owned(), v)).collect(),
            timestamp,
        })
    }

    /// The modelled class, if the registry knows it.
    pub fn mo_class(&self) -> Option<MoClass> {
        MoClass::from_apic(&self.class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn to_item(&self) -> Value {
        let attributes: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut body = Map::new();
        body.insert("attributes".into(), Value::Object(attributes));
        let mut item = Map::new();
        item.insert(self.class.clone(), Value::Object(body));
        Value::Object(item)
    }
}

/// An entry popped from a class subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassEvent {
    Change(MoEvent),
    /// The subscription was rebuilt; changes around this point may be missing.
    Reset,
}

impl TryFrom<SubscriptionEvent> for ClassEvent {
    type Error = CoreError;

    fn try_from(event: SubscriptionEvent) -> Result<Self, Self::Error> {
        match event {
            SubscriptionEvent::Snapshot(v) | SubscriptionEvent::Change(v) => {
                MoEvent::from_item(&v).map(Self::Change)
            }
            SubscriptionEvent::Reset => Ok(Self::Reset),
        }
    }
}

/// URL a class subscription is keyed by.
pub fn class_subscription_url(class: MoClass) -> String {
    Query::class(class.apic_class()).to_url()
}

/// Class-level view of a session's subscriptions.
pub trait ClassEvents {
    fn subscribe_class(
        &self,
        class: MoClass,
        only_new: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn unsubscribe_class(&self, class: MoClass) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn has_class_events(&self, class: MoClass) -> bool;

    /// Pop without waiting; `NoEvent` when the queue is empty.
    fn class_event(&self, class: MoClass) -> Result<ClassEvent, CoreError>;

    fn next_class_event(&self, class: MoClass) -> impl Future<Output = Result<ClassEvent, CoreError>> + Send;
}

impl ClassEvents for Session {
    async fn subscribe_class(&self, class: MoClass, only_new: bool) -> Result<(), CoreError> {
        self.subscribe(&class_subscription_url(class), only_new).await?;
        Ok(())
    }

    async fn unsubscribe_class(&self, class: MoClass) -> Result<(), CoreError> {
        self.unsubscribe(&class_subscription_url(class)).await?;
        Ok(())
    }

    fn has_class_events(&self, class: MoClass) -> bool {
        self.has_events(&class_subscription_url(class))
    }

    fn class_event(&self, class: MoClass) -> Result<ClassEvent, CoreError> {
        self.get_event(&class_subscription_url(class))?.try_into()
    }

    async fn next_class_event(&self, class: MoClass) -> Result<ClassEvent, CoreError> {
        self.next_event(&class_subscription_url(class)).await?.try_into()
    }
}

impl MoGraph {
    /// Bring the graph in line with one controller event.
    ///
    /// Objects are placed by DN with stub ancestors; deletions unlink the
    /// subtree. Reference events update the source's relations. Returns
    /// the affected object when it is still in the graph.
    pub fn apply_event(&mut self, event: &MoEvent) -> Result<Option<MoId>, CoreError> {
        if RelationKind::from_apic(&event.class).is_some() || event.class == wire::TAG_CLASS {
            let Some(source) = crate::dn::parent_dn(&event.dn).and_then(|p| self.find_by_dn(p)) else {
                debug!(class = %event.class, dn = %event.dn, "event for an object not in the graph");
                return Ok(None);
            };
            wire::ingest(self, Some(source), &event.to_item(), IngestOptions::default())?;
            return Ok(Some(source));
        }
        if event.mo_class().is_none() {
            debug!(class = %event.class, "skipping event of unknown class");
            return Ok(None);
        }

        if event.status == EventStatus::Deleted {
            if let Some(id) = self.find_by_dn(&event.dn) {
                self.remove_subtree(id);
            }
            return Ok(None);
        }

        let id = self.place(&event.dn)?;
        for (k, v) in &event.attributes {
            if !DERIVED_ATTRIBUTES.contains(&k.as_str()) {
                self.set_attribute_raw(id, k, v);
            }
        }
        self.set_lifecycle(id, Lifecycle::Modified);
        Ok(Some(id))
    }
}
