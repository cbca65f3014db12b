use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use raynav::{
    histories::{run_histories, trace_history},
    properties::ModelProperties,
    settings, FacetKernel, Model, NavError, NavigationContext,
};

// Tolerance for distances along axis-aligned rays
const TOL: f64 = 1e-9;

fn data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

fn context(name: &str, threads: usize) -> NavigationContext<FacetKernel> {
    let model = Model::initialize(
        FacetKernel::new(),
        &data(name),
        1e-3,
        ModelProperties::default(),
    )
    .unwrap();
    let mut nav = NavigationContext::new(model);
    nav.enable_thread_support(threads);
    nav
}

fn start() -> Point3<f64> {
    Point3::new(0.1, 0.2, 0.3)
}

fn plus_x() -> Vector3<f64> {
    Vector3::new(1.0, 0.0, 0.0)
}

#[test]
fn walk_out_of_nested_cubes() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray(0, &start(), &plus_x(), true).unwrap();
    assert_eq!(nav.find_cell_containing_internal_ray(0), 1);

    let (surface, distance) = nav.fire_internal_ray(0).unwrap();
    assert_eq!(surface, 1);
    assert_relative_eq!(distance, 0.9, epsilon = TOL);

    let expected = [(2, 2, 1.0), (3, 3, 1.0)];
    for (cell, surface, distance) in expected {
        assert!(!nav.advance_internal_ray_to_cell_boundary(0).unwrap());
        assert_eq!(nav.find_cell_containing_internal_ray(0), cell);
        let (hit, d) = nav.fire_internal_ray(0).unwrap();
        assert_eq!(hit, surface);
        assert_relative_eq!(d, distance, epsilon = TOL);
    }

    assert!(!nav.advance_internal_ray_to_cell_boundary(0).unwrap());
    let cell = nav.find_cell_containing_internal_ray(0);
    assert_eq!(cell, 4);
    assert!(nav.model().is_termination_cell(cell));
    assert_relative_eq!(nav.internal_ray_position(0).x, 3.0, epsilon = TOL);

    // nothing bounds the outside world
    assert!(matches!(
        nav.fire_internal_ray(0),
        Err(NavError::RayMisfire { cell: 4, .. })
    ));
}

#[test]
fn fire_is_memoized_until_the_ray_moves() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray(0, &start(), &plus_x(), false).unwrap();
    let first = nav.fire_internal_ray(0).unwrap();
    let second = nav.fire_internal_ray(0).unwrap();
    assert_eq!(first, second);
}

#[test]
fn substep_shortens_the_remaining_distance() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray(0, &start(), &plus_x(), false).unwrap();
    let (surface, distance) = nav.fire_internal_ray(0).unwrap();

    nav.advance_internal_ray_by_substep(0, 0.4).unwrap();
    let (after, remaining) = nav.fire_internal_ray(0).unwrap();
    assert_eq!(after, surface);
    assert_relative_eq!(remaining, distance - 0.4, epsilon = TOL);
    assert_relative_eq!(nav.internal_ray_position(0).x, 0.5, epsilon = TOL);
    assert_eq!(nav.find_cell_containing_internal_ray(0), 1);

    // the substep does not disturb the next crossing
    assert!(!nav.advance_internal_ray_to_cell_boundary(0).unwrap());
    assert_eq!(nav.find_cell_containing_internal_ray(0), 2);
}

#[test]
#[should_panic(expected = "substep")]
fn substep_to_the_boundary_panics() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray(0, &start(), &plus_x(), false).unwrap();
    nav.advance_internal_ray_by_substep(0, 0.9).unwrap();
}

#[test]
fn direction_change_refires() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray(0, &start(), &plus_x(), false).unwrap();
    nav.fire_internal_ray(0).unwrap();

    nav.change_internal_ray_direction(0, &Vector3::new(0.0, 1.0, 0.0));
    assert_relative_eq!(nav.internal_ray_direction(0), Vector3::new(0.0, 1.0, 0.0));
    let (surface, distance) = nav.fire_internal_ray(0).unwrap();
    assert_eq!(surface, 1);
    assert_relative_eq!(distance, 0.8, epsilon = TOL);
}

#[test]
fn reflection_keeps_the_cell() {
    let nav = context("reflecting_cubes.toml", 1);
    assert!(nav.model().is_reflecting_surface(2));
    assert!(!nav.model().is_reflecting_surface(1));

    nav.set_internal_ray(0, &start(), &plus_x(), false).unwrap();
    assert!(!nav.advance_internal_ray_to_cell_boundary(0).unwrap());
    assert_eq!(nav.find_cell_containing_internal_ray(0), 2);

    assert!(nav.advance_internal_ray_to_cell_boundary(0).unwrap());
    assert_eq!(nav.find_cell_containing_internal_ray(0), 2);
    assert_relative_eq!(nav.internal_ray_position(0).x, 2.0, epsilon = TOL);
    assert_relative_eq!(
        nav.internal_ray_direction(0),
        Vector3::new(-1.0, 0.0, 0.0),
        epsilon = TOL
    );

    // back towards the inner cube
    let (surface, distance) = nav.fire_internal_ray(0).unwrap();
    assert_eq!(surface, 1);
    assert_relative_eq!(distance, 1.0, epsilon = TOL);
}

#[test]
fn crossings_report_the_surface_normal() {
    let nav = context("reflecting_cubes.toml", 1);
    nav.set_internal_ray(0, &start(), &plus_x(), false).unwrap();

    // ordinary crossing out of the inner cube
    let (reflected, normal) = nav.advance_internal_ray_to_cell_boundary_with_normal(0).unwrap();
    assert!(!reflected);
    assert_eq!(nav.find_cell_containing_internal_ray(0), 2);
    assert_relative_eq!(normal, Vector3::new(1.0, 0.0, 0.0), epsilon = TOL);

    // reflecting surface: the normal the direction was mirrored about
    let (reflected, normal) = nav.advance_internal_ray_to_cell_boundary_with_normal(0).unwrap();
    assert!(reflected);
    assert_relative_eq!(normal, Vector3::new(1.0, 0.0, 0.0), epsilon = TOL);
    assert_relative_eq!(nav.internal_ray_direction(0), -normal, epsilon = TOL);

    // back into the inner cube through the same surface, same orientation
    let (reflected, normal) = nav.advance_internal_ray_to_cell_boundary_with_normal(0).unwrap();
    assert!(!reflected);
    assert_eq!(nav.find_cell_containing_internal_ray(0), 1);
    assert_relative_eq!(normal, Vector3::new(1.0, 0.0, 0.0), epsilon = TOL);
}

#[test]
fn oblique_reflection_mirrors_the_normal_component() {
    let nav = context("reflecting_cubes.toml", 1);
    let dir = Vector3::new(1.0, 1.0, 0.0).normalize();
    let origin = Point3::new(1.5, 0.2, 0.3);
    nav.set_internal_ray(0, &origin, &dir, false).unwrap();
    assert_eq!(nav.find_cell_containing_internal_ray(0), 2);

    // x = 2 is reached first from (1.5, 0.2)
    assert!(nav.advance_internal_ray_to_cell_boundary(0).unwrap());
    let reflected = nav.internal_ray_direction(0);
    assert_relative_eq!(reflected, Vector3::new(-dir.x, dir.y, 0.0), epsilon = TOL);
    assert_relative_eq!(reflected.norm(), 1.0, epsilon = TOL);
}

#[test]
fn cached_lookup_matches_brute_force() {
    let nav = context("nested_cubes.toml", 1);
    let dir = Vector3::new(0.0, 0.0, 1.0);
    let points = [
        Point3::new(0.1, 0.2, 0.3),
        Point3::new(1.5, 0.2, 0.3),
        Point3::new(0.1, 2.5, 0.3),
        Point3::new(7.0, -3.0, 1.0),
        Point3::new(0.3, -0.2, 0.1),
    ];
    for p in &points {
        let brute = nav.find_cell_handle_containing_ray(p, &dir, false).unwrap();
        let cached = nav.find_and_cache_cell_handle_containing_ray(p, &dir).unwrap();
        assert_eq!(brute, cached);
        assert_eq!(nav.check_found_cell_cache(p, &dir).unwrap(), Some(brute));
    }
    assert_eq!(nav.found_cell_cache().len(), 4);

    nav.found_cell_cache().clear();
    assert!(nav.check_found_cell_cache(&points[0], &dir).unwrap().is_none());
}

#[test]
fn set_internal_ray_in_known_cell() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray_in_cell(0, &Point3::new(2.5, 0.2, 0.3), &plus_x(), 3, true)
        .unwrap();
    assert_eq!(nav.find_cell_containing_internal_ray(0), 3);
    assert_eq!(nav.found_cell_cache().len(), 1);
    let (surface, distance) = nav.fire_internal_ray(0).unwrap();
    assert_eq!(surface, 3);
    assert_relative_eq!(distance, 0.5, epsilon = TOL);

    assert!(nav
        .set_internal_ray_in_cell(0, &Point3::origin(), &plus_x(), 99, false)
        .is_err());
}

#[test]
fn closest_boundary_distance() {
    let nav = context("nested_cubes.toml", 1);
    nav.set_internal_ray(0, &Point3::new(0.1, 0.2, 0.7), &plus_x(), false)
        .unwrap();
    assert_relative_eq!(nav.distance_to_closest_boundary(0).unwrap(), 0.3, epsilon = TOL);
}

#[test]
fn ray_grazing_a_boundary_is_in_no_cell() {
    let nav = context("nested_cubes.toml", 1);
    // on the inner cube and moving along it: on the boundary of cells 1 and 2
    let on_face = Point3::new(1.0, 0.2, 0.3);
    let along = Vector3::new(0.0, 1.0, 0.0);
    assert!(matches!(
        nav.find_cell_handle_containing_ray(&on_face, &along, false),
        Err(NavError::GeometryNavigation { .. })
    ));
    assert!(nav.set_internal_ray(0, &on_face, &along, false).is_err());
    assert!(!nav.is_internal_ray_set(0));
}

#[test]
fn external_ray_from_a_given_cell() {
    let nav = context("nested_cubes.toml", 1);
    let (surface, distance) = nav
        .fire_external_ray(&Point3::new(2.5, 0.2, 0.3), &plus_x(), Some(3))
        .unwrap();
    assert_eq!(surface, 3);
    assert_relative_eq!(distance, 0.5, epsilon = TOL);
}

#[test]
fn threads_trace_independently() {
    let nav = context("nested_cubes.toml", 2);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    let summary = pool
        .install(|| run_histories(&nav, &Point3::origin(), 200, Some(7), true))
        .unwrap();

    assert_eq!(summary.histories, 200);
    assert_eq!(summary.terminated, 200);
    // every ray from the centre crosses the three shells once
    assert_eq!(summary.crossings, 600);
    assert_eq!(summary.reflections, 0);
    assert!(summary.mean_path_length() >= 3.0 - TOL);
    assert!(summary.mean_path_length() <= 3.0 * 3f64.sqrt() + TOL);
}

#[test]
#[should_panic(expected = "enable_thread_support")]
fn pool_wider_than_the_ray_slots_is_rejected() {
    let nav = context("nested_cubes.toml", 1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let _ = pool.install(|| run_histories(&nav, &Point3::origin(), 10, Some(1), false));
}

#[test]
fn trace_single_history_with_reflection() {
    let nav = context("reflecting_cubes.toml", 1);
    // mirrored between x = -2 and x = 2 forever, so the history is abandoned
    let outcome = trace_history(&nav, 0, &start(), &plus_x(), false).unwrap();
    assert!(outcome.termination_cell.is_none());
    assert!(outcome.reflections > 0);
    assert_eq!(outcome.crossings, raynav::histories::MAX_CROSSINGS);
}

#[test]
fn default_settings_drive_a_run() {
    let settings = settings::load_default_config().unwrap();
    let model = Model::initialize(
        FacetKernel::new(),
        &settings.model,
        settings.facet_tolerance,
        settings.properties.clone(),
    )
    .unwrap();
    let mut nav = NavigationContext::new(model);
    nav.enable_thread_support(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let summary = pool
        .install(|| run_histories(&nav, &Point3::origin(), 10, settings.seed, settings.use_cell_cache))
        .unwrap();
    assert_eq!(summary.terminated, 10);
}
