use skytag::Resolver;

pub struct AppState {
    pub resolver: Resolver,
}
