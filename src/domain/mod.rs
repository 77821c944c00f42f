mod channel;
mod listing;
mod order;
mod staff;
mod template;

pub use channel::{BookkeepingPolicy, Channel, ChannelCategory, LocationFilter, NewChannel};
pub use listing::{Listing, ListingMedia, ListingStatus, NewListing};
pub use order::Order;
pub use staff::{Agent, TeamLead};
pub use template::Template;
