use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use kivendi_auth::{auth_middleware, JwtService};

use crate::{ads, boost, chat, handlers, moderation, notifications, AppState};

pub fn create_routes(jwt_service: JwtService) -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Ads
        .route("/ads", post(ads::handlers::create_ad))
        .route(
            "/ads/:ad_id",
            get(ads::handlers::get_ad)
                .put(ads::handlers::update_ad)
                .delete(ads::handlers::delete_ad),
        )
        .route("/ads/:ad_id/sold", post(ads::handlers::mark_sold))
        .route("/me/ads", get(ads::handlers::my_ads))

        // Conversations
        .route("/ads/:ad_id/conversations", post(chat::handlers::open_conversation))
        .route("/conversations", get(chat::handlers::list_conversations))
        .route("/conversations/:conversation_id/messages", get(chat::handlers::get_messages))
        .route("/conversations/:conversation_id/read", post(chat::handlers::mark_read))
        .route("/conversations/:conversation_id/block", post(moderation::handlers::block))
        .route("/conversations/:conversation_id/unblock", post(moderation::handlers::unblock))
        .route("/conversations/:conversation_id/block-status", get(moderation::handlers::block_status))
        .route("/conversations/:conversation_id/report", post(moderation::handlers::report))

        // WebSockets
        .route("/ws/conversations/:conversation_id", get(chat::websocket::conversation_socket))
        .route("/ws/notifications", get(chat::websocket::notifications_socket))

        // Boosts
        .route("/boost-offers", get(boost::handlers::list_offers))
        .route("/boost-offers/:offer_id", get(boost::handlers::get_offer))
        .route("/ads/:ad_id/boost", post(boost::handlers::purchase_boost))
        .route("/ads/:ad_id/boost-status", get(boost::handlers::boost_status))
        .route("/boosted-ads", get(boost::handlers::list_boosted_ads))
        .route("/me/boosts", get(boost::handlers::my_boosts))
        .route("/webhooks/kkiapay", post(boost::handlers::kkiapay_webhook))

        // Notifications
        .route(
            "/device-tokens",
            post(notifications::handlers::register_device_token)
                .delete(notifications::handlers::remove_device_token),
        )
        .route("/notifications", get(notifications::handlers::list_notifications))
        .route("/notifications/unread-count", get(notifications::handlers::unread_count))
        .route("/notifications/read-all", post(notifications::handlers::mark_all_read))
        .route("/notifications/:notification_id/read", post(notifications::handlers::mark_read))
        .route(
            "/me/notification-preferences",
            get(notifications::handlers::get_preferences).put(notifications::handlers::update_preferences),
        )

        // Staff
        .route("/admin/auth/login", post(handlers::staff_login))
        .route(
            "/admin/ads/:ad_id",
            put(ads::handlers::admin_update_ad).delete(ads::handlers::admin_delete_ad),
        )
        .route("/admin/ads/:ad_id/validate", post(ads::handlers::validate_ad))
        .route("/admin/ads/:ad_id/reject", post(ads::handlers::reject_ad))
        .route("/admin/ads/:ad_id/deactivate", post(ads::handlers::deactivate_ad))
        .route("/admin/ads/:ad_id/boost", post(boost::handlers::admin_grant_boost))
        .route("/admin/boosts/:boost_id/deactivate", post(boost::handlers::admin_deactivate_boost))
        .route(
            "/admin/boost-offers",
            get(boost::handlers::admin_list_offers).post(boost::handlers::admin_create_offer),
        )
        .route(
            "/admin/boost-offers/:offer_id",
            put(boost::handlers::admin_update_offer).delete(boost::handlers::admin_delete_offer),
        )
        .route("/admin/reports", get(moderation::handlers::list_reports))
        .route("/admin/reports/:report_id", put(moderation::handlers::update_report))

        // Claims are attached when a token is present; extractors enforce them.
        .layer(middleware::from_fn_with_state(jwt_service, auth_middleware))
}
