use orders::{OrderId, OrderStatus, OrderSummary};

use crate::collaborators::Navigator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Orders,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Orders => "/orders",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationStyle {
    #[default]
    Default,
    Destructive,
}

impl NotificationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStyle::Default => "default",
            NotificationStyle::Destructive => "destructive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub label: String,
    pub route: Route,
}

impl NotificationAction {
    pub fn view_orders() -> Self {
        Self {
            label: "View".into(),
            route: Route::Orders,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub action: Option<NotificationAction>,
    pub style: NotificationStyle,
}

impl Notification {
    pub fn new_order(id: &OrderId, summary: &OrderSummary) -> Self {
        let body = match summary.total_amount {
            Some(amount) => format!("New order received for ${amount}"),
            None => "New order received".to_string(),
        };
        Self {
            title: format!("New Order #{}", summary.display_label(id)),
            body,
            action: Some(NotificationAction::view_orders()),
            style: NotificationStyle::Default,
        }
    }

    pub fn status_changed(id: &OrderId, summary: &OrderSummary, status: OrderStatus) -> Self {
        Self {
            title: format!("Order #{} updated", summary.display_label(id)),
            body: format!("Status changed to {status}"),
            action: Some(NotificationAction::view_orders()),
            style: NotificationStyle::Default,
        }
    }

    pub fn permission_denied() -> Self {
        Self {
            title: "Connection Error".into(),
            body: "Cannot connect to orders. Check the feed access rules for this shop.".into(),
            action: None,
            style: NotificationStyle::Destructive,
        }
    }

    pub fn connection_error() -> Self {
        Self {
            title: "Connection Error".into(),
            body: "Lost connection to live orders. New orders may not appear until it recovers."
                .into(),
            action: None,
            style: NotificationStyle::Destructive,
        }
    }

    /// Follows the attached action, if any. Called by the front end when the
    /// owner clicks the notification. Returns whether navigation happened.
    pub fn activate(&self, navigator: &dyn Navigator) -> bool {
        match &self.action {
            Some(action) => {
                navigator.navigate(action.route);
                true
            }
            None => false,
        }
    }
}
