use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::model::DeviceEvent;

/// Broadcast bus for discovery events. Subscribers that drop their
/// receiver are pruned on the next broadcast.
#[derive(Clone, Default)]
pub(crate) struct DeviceEventBus {
    subscribers: Arc<Mutex<Vec<Sender<DeviceEvent>>>>,
}

impl DeviceEventBus {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<DeviceEvent> {
        let (tx, rx) = unbounded::<DeviceEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: DeviceEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Device, DeviceId};

    fn device(id: &str) -> Device {
        Device {
            id: DeviceId(id.to_string()),
            name: "TV".into(),
            address: "192.168.1.20".into(),
            is_tv: true,
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let bus = DeviceEventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.broadcast(DeviceEvent::Added(device("http://h/a.xml")));

        assert!(matches!(rx1.try_recv(), Ok(DeviceEvent::Added(_))));
        assert!(matches!(rx2.try_recv(), Ok(DeviceEvent::Added(_))));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = DeviceEventBus::new();
        let rx = bus.subscribe();
        drop(bus.subscribe());

        bus.broadcast(DeviceEvent::Removed(DeviceId("http://h/a.xml".into())));
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::Removed(_))));
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }
}
