use verdin::Document;

/// One subaccount of a wallet, identified by its backend pointer.
#[derive(Debug, Clone)]
pub struct Account {
    pointer: u32,
    data: Document,
    /// Bumped whenever a notification touches this account, so consumers
    /// know to refetch balances and transaction lists.
    generation: u64,
}

impl Account {
    pub fn new(pointer: u32, data: Document) -> Self {
        Self {
            pointer,
            data,
            generation: 0,
        }
    }

    pub fn pointer(&self) -> u32 {
        self.pointer
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn name(&self) -> &str {
        self.data.maybe_str("name").ok().flatten().unwrap_or("")
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn update(&mut self, data: Document) {
        self.data = data;
        self.generation += 1;
    }

    pub fn on_transaction(&mut self, _tx: &Document) {
        self.generation += 1;
    }

    pub fn on_block(&mut self, _block: &Document) {
        self.generation += 1;
    }
}

/// A known asset on a liquid network.
#[derive(Debug, Clone)]
pub struct Asset {
    id: String,
    data: Document,
    icon: Option<String>,
}

impl Asset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Document::new(),
            icon: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn set_data(&mut self, data: Document) {
        self.data = data;
    }

    pub fn name(&self) -> &str {
        self.data.maybe_str("name").ok().flatten().unwrap_or("")
    }

    /// The asset icon as a data URL, if the registry provided one.
    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    /// Store a registry-provided base64 PNG payload as a data URL.
    pub fn set_icon(&mut self, base64_png: &str) {
        self.icon = Some(format!("data:image/png;base64,{}", base64_png));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_tracks_generation() {
        let mut account = Account::new(0, Document::new());
        assert_eq!(account.generation(), 0);
        account.on_transaction(&Document::new());
        account.on_block(&Document::new());
        assert_eq!(account.generation(), 2);

        let data = Document::try_from(json!({"name": "Main", "pointer": 0})).unwrap();
        account.update(data);
        assert_eq!(account.name(), "Main");
        assert_eq!(account.generation(), 3);
    }

    #[test]
    fn asset_icon_data_url() {
        let mut asset = Asset::new("abcdef");
        assert!(asset.icon().is_none());
        asset.set_icon("aGVsbG8=");
        assert_eq!(asset.icon(), Some("data:image/png;base64,aGVsbG8="));
    }
}
