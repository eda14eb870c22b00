use colored::Colorize;
use hwcloud_resource::Registry;

pub fn handle(registry: &Registry) {
    println!("{}", "リソース:".bold());
    for type_name in registry.resource_types() {
        println!("  • {}", type_name.cyan());
    }
    println!();
    println!("{}", "データソース:".bold());
    for type_name in registry.data_source_types() {
        println!("  • {}", type_name.cyan());
    }
}
