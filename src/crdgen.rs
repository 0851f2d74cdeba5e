use controller::apis::backup_types::DatabaseBackup;
use kube::CustomResourceExt;

fn main() -> controller::Result<()> {
    let mut crd = DatabaseBackup::crd();

    // Ensure metadata exists
    if crd.metadata.annotations.is_none() {
        crd.metadata.annotations = Some(Default::default());
    }

    // Keep backups around when the chart is uninstalled
    if let Some(annotations) = crd.metadata.annotations.as_mut() {
        annotations.insert("helm.sh/resource-policy".to_string(), "keep".to_string());
    }

    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
