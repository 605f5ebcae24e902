//! In-process bus for study-update and audit events.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::notification::events::{ElementUpdate, StudyUpdate};

#[derive(Clone)]
pub struct NotificationBus {
    studies: UnboundedSender<StudyUpdate>,
    elements: UnboundedSender<ElementUpdate>,
}

pub struct NotificationReceivers {
    pub studies: UnboundedReceiver<StudyUpdate>,
    pub elements: UnboundedReceiver<ElementUpdate>,
}

impl NotificationBus {
    pub fn new_pair() -> (Self, NotificationReceivers) {
        let (studies, study_rx) = unbounded_channel();
        let (elements, element_rx) = unbounded_channel();
        (
            Self { studies, elements },
            NotificationReceivers {
                studies: study_rx,
                elements: element_rx,
            },
        )
    }

    /// A bus nobody listens to. Events are dropped.
    pub fn detached() -> Self {
        Self::new_pair().0
    }

    /// Publish a study update. A closed channel only means nobody is listening.
    pub fn publish(&self, update: StudyUpdate) {
        let update_type = update.update_type;
        if self.studies.send(update).is_err() {
            trace!(update_type = update_type.as_str(), "Study update dropped, no listener");
        }
    }

    pub fn audit(&self, update: ElementUpdate) {
        if self.elements.send(update).is_err() {
            trace!("Element update dropped, no listener");
        }
    }
}

impl NotificationReceivers {
    /// Everything published so far, without waiting.
    pub fn drain_studies(&mut self) -> Vec<StudyUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = self.studies.try_recv() {
            out.push(update);
        }
        out
    }

    pub fn drain_elements(&mut self) -> Vec<ElementUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = self.elements.try_recv() {
            out.push(update);
        }
        out
    }
}
