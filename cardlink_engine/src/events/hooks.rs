use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    RequestAcceptedEvent,
    RequestAnnulledEvent,
    RequestCompletedEvent,
    RequestCreatedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub request_created_producer: Vec<EventProducer<RequestCreatedEvent>>,
    pub request_accepted_producer: Vec<EventProducer<RequestAcceptedEvent>>,
    pub request_annulled_producer: Vec<EventProducer<RequestAnnulledEvent>>,
    pub request_completed_producer: Vec<EventProducer<RequestCompletedEvent>>,
}

pub struct EventHandlers {
    pub on_request_created: Option<EventHandler<RequestCreatedEvent>>,
    pub on_request_accepted: Option<EventHandler<RequestAcceptedEvent>>,
    pub on_request_annulled: Option<EventHandler<RequestAnnulledEvent>>,
    pub on_request_completed: Option<EventHandler<RequestCompletedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_request_created = hooks.on_request_created.map(|f| EventHandler::new(buffer_size, f));
        let on_request_accepted = hooks.on_request_accepted.map(|f| EventHandler::new(buffer_size, f));
        let on_request_annulled = hooks.on_request_annulled.map(|f| EventHandler::new(buffer_size, f));
        let on_request_completed = hooks.on_request_completed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_request_created, on_request_accepted, on_request_annulled, on_request_completed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_request_created {
            result.request_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_request_accepted {
            result.request_accepted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_request_annulled {
            result.request_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_request_completed {
            result.request_completed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_request_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_request_accepted {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_request_annulled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_request_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_request_created: Option<Handler<RequestCreatedEvent>>,
    pub on_request_accepted: Option<Handler<RequestAcceptedEvent>>,
    pub on_request_annulled: Option<Handler<RequestAnnulledEvent>>,
    pub on_request_completed: Option<Handler<RequestCompletedEvent>>,
}

impl EventHooks {
    pub fn on_request_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RequestCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_request_created = Some(Arc::new(f));
        self
    }

    pub fn on_request_accepted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RequestAcceptedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_request_accepted = Some(Arc::new(f));
        self
    }

    pub fn on_request_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RequestAnnulledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_request_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_request_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RequestCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_request_completed = Some(Arc::new(f));
        self
    }
}
