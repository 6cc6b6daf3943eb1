use std::sync::Arc;

use itertools::Itertools;
use sipecho_util::DnsResolver;

use super::{Endpoint, Inner};
use crate::{
    headers::{Header, Headers},
    service::SipService,
    transaction::TransactionLayer,
    transport::TransportLayer,
};

/// Builder for creating a new SIP [`Endpoint`].
pub struct Builder {
    name: String,
    resolver: DnsResolver,
    transaction: Option<TransactionLayer>,
    capabilities: Headers<'static>,
    services: Vec<Box<dyn SipService>>,
}

impl Builder {
    /// Creates a new default instance of `Builder` to
    /// construct an `Endpoint`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sipecho::*;
    /// let endpoint = endpoint::Builder::new()
    ///     .with_name("My Endpoint")
    ///     .build();
    /// ```
    pub fn new() -> Self {
        Builder {
            name: String::new(),
            capabilities: Headers::new(),
            resolver: DnsResolver::default(),
            services: Vec::new(),
            transaction: None,
        }
    }

    /// Sets the endpoint name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sipecho::*;
    /// let endpoint = endpoint::Builder::new()
    ///     .with_name("My Endpoint")
    ///     .build();
    /// ```
    pub fn with_name<T: AsRef<str>>(mut self, s: T) -> Self {
        self.name = s.as_ref().to_string();

        self
    }

    /// Add a new capability to the endpoint.
    ///
    /// Capabilities are headers such as `Allow` that describe
    /// what the endpoint supports, and are advertised in
    /// responses to `OPTIONS` requests.
    pub fn add_capability(mut self, capability: Header<'static>) -> Self {
        self.capabilities.push(capability);

        self
    }

    /// Adds a service to the endpoint.
    ///
    /// This function can be called multiple times to add
    /// additional services. If a service with the same
    /// name already exists, the new service will not be
    /// added.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sipecho::*;
    /// struct MyService;
    ///
    /// impl SipService for MyService {
    ///     fn name(&self) -> &str {
    ///         "MyService"
    ///     }
    /// }
    /// let endpoint = endpoint::Builder::new()
    ///     .add_service(MyService)
    ///     .build();
    /// ```
    pub fn add_service(mut self, service: impl SipService) -> Self {
        if self.service_exists(service.name()) {
            return self;
        }
        self.services.push(Box::new(service));

        self
    }

    fn service_exists(&self, name: &str) -> bool {
        let exists = self.services.iter().any(|s| s.name() == name);
        if exists {
            tracing::warn!("Service with name '{}' already exists", name);
        }
        exists
    }

    /// Sets the transaction layer.
    pub fn with_transaction_layer(mut self, tsx_layer: TransactionLayer) -> Self {
        self.transaction = Some(tsx_layer);

        self
    }

    /// Finalize the `Builder` into an `Endpoint`.
    pub fn build(self) -> Endpoint {
        tracing::trace!("Creating endpoint...");
        tracing::debug!(
            "Services registered ({})",
            self.services.iter().map(|s| s.name()).join(", ")
        );

        Endpoint(Arc::new(Inner {
            transaction: self.transaction,
            transport: TransportLayer::new(),
            name: self.name,
            capabilities: self.capabilities,
            resolver: self.resolver,
            services: self.services.into_boxed_slice(),
        }))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
